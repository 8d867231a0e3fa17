//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a `ProviderService` the way the orchestrator
//! would, without any transport. [`MockPrefixApi`] is an in-memory
//! [`PrefixApi`] that records every call and can be told to fail.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloudflare_ip_prefix_provider::testing::{MockPrefixApi, ProviderTester};
//! use cloudflare_ip_prefix_provider::IpPrefixProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_read_prefix() {
//!     let api = Arc::new(MockPrefixApi::new().with_prefix("prefix-abc", "primary range", true));
//!     let tester = ProviderTester::new(IpPrefixProvider::with_client(api));
//!
//!     let state = tester
//!         .read("cloudflare_ip_prefix", json!({"prefix_id": "prefix-abc"}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["advertisement"], "on");
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::client::{AdvertisementStatus, Prefix, PrefixApi};
use crate::error::{ApiError, ProviderError};
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;

        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;

        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;

        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;

        self.read(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;

        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;

        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;

        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;

        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Mock API
// =========================================================================

/// A call received by [`MockPrefixApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `get_prefix(id)`
    GetPrefix(String),
    /// `get_advertisement_status(id)`
    GetAdvertisementStatus(String),
    /// `update_prefix_description(id, description)`
    UpdatePrefixDescription(String, String),
    /// `update_advertisement_status(id, advertised)`
    UpdateAdvertisementStatus(String, bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    GetPrefix,
    GetAdvertisementStatus,
    UpdatePrefixDescription,
    UpdateAdvertisementStatus,
}

#[derive(Debug, Default)]
struct MockState {
    prefixes: HashMap<String, (String, bool)>,
    calls: Vec<MockCall>,
    failing: HashSet<Operation>,
}

/// In-memory [`PrefixApi`].
///
/// Unknown prefixes answer 404. Operations marked failing answer 500
/// without touching stored data.
#[derive(Debug, Default)]
pub struct MockPrefixApi {
    state: Mutex<MockState>,
}

impl MockPrefixApi {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a prefix.
    pub fn with_prefix(
        self,
        prefix_id: impl Into<String>,
        description: impl Into<String>,
        advertised: bool,
    ) -> Self {
        self.lock()
            .prefixes
            .insert(prefix_id.into(), (description.into(), advertised));
        self
    }

    /// Make `get_prefix` fail.
    pub fn fail_get_prefix(self) -> Self {
        self.failing(Operation::GetPrefix)
    }

    /// Make `get_advertisement_status` fail.
    pub fn fail_get_advertisement_status(self) -> Self {
        self.failing(Operation::GetAdvertisementStatus)
    }

    /// Make `update_prefix_description` fail.
    pub fn fail_update_description(self) -> Self {
        self.failing(Operation::UpdatePrefixDescription)
    }

    /// Make `update_advertisement_status` fail.
    pub fn fail_update_advertisement_status(self) -> Self {
        self.failing(Operation::UpdateAdvertisementStatus)
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Stored description of a prefix.
    pub fn description(&self, prefix_id: &str) -> Option<String> {
        self.lock().prefixes.get(prefix_id).map(|(d, _)| d.clone())
    }

    /// Stored advertisement of a prefix (`false` if unknown).
    pub fn advertised(&self, prefix_id: &str) -> bool {
        self.lock()
            .prefixes
            .get(prefix_id)
            .map(|(_, a)| *a)
            .unwrap_or(false)
    }

    fn failing(self, operation: Operation) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and return the stored entry, or the injected failure.
    fn begin(
        &self,
        operation: Operation,
        call: MockCall,
        prefix_id: &str,
    ) -> Result<MutexGuard<'_, MockState>, ApiError> {
        let mut state = self.lock();
        state.calls.push(call);

        if state.failing.contains(&operation) {
            return Err(ApiError::Status {
                status: 500,
                messages: vec!["injected failure".to_string()],
            });
        }
        if !state.prefixes.contains_key(prefix_id) {
            return Err(ApiError::Status {
                status: 404,
                messages: vec!["Prefix not found".to_string()],
            });
        }
        Ok(state)
    }
}

fn prefix(prefix_id: &str, description: &str) -> Prefix {
    Prefix {
        id: prefix_id.to_string(),
        description: description.to_string(),
        ..Default::default()
    }
}

fn status(advertised: bool) -> AdvertisementStatus {
    AdvertisementStatus {
        advertised,
        advertised_modified_at: None,
    }
}

#[async_trait::async_trait]
impl PrefixApi for MockPrefixApi {
    async fn get_prefix(&self, prefix_id: &str) -> Result<Prefix, ApiError> {
        let state = self.begin(
            Operation::GetPrefix,
            MockCall::GetPrefix(prefix_id.to_string()),
            prefix_id,
        )?;
        let (description, _) = &state.prefixes[prefix_id];
        Ok(prefix(prefix_id, description))
    }

    async fn get_advertisement_status(
        &self,
        prefix_id: &str,
    ) -> Result<AdvertisementStatus, ApiError> {
        let state = self.begin(
            Operation::GetAdvertisementStatus,
            MockCall::GetAdvertisementStatus(prefix_id.to_string()),
            prefix_id,
        )?;
        Ok(status(state.prefixes[prefix_id].1))
    }

    async fn update_prefix_description(
        &self,
        prefix_id: &str,
        description: &str,
    ) -> Result<Prefix, ApiError> {
        let mut state = self.begin(
            Operation::UpdatePrefixDescription,
            MockCall::UpdatePrefixDescription(prefix_id.to_string(), description.to_string()),
            prefix_id,
        )?;
        if let Some(entry) = state.prefixes.get_mut(prefix_id) {
            entry.0 = description.to_string();
        }
        Ok(prefix(prefix_id, description))
    }

    async fn update_advertisement_status(
        &self,
        prefix_id: &str,
        advertised: bool,
    ) -> Result<AdvertisementStatus, ApiError> {
        let mut state = self.begin(
            Operation::UpdateAdvertisementStatus,
            MockCall::UpdateAdvertisementStatus(prefix_id.to_string(), advertised),
            prefix_id,
        )?;
        if let Some(entry) = state.prefixes.get_mut(prefix_id) {
            entry.1 = advertised;
        }
        Ok(status(advertised))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        plan.has_changes(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::IpPrefixProvider;
    use crate::resource::RESOURCE_TYPE;
    use crate::types::AttributeChange;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_records_calls_and_updates() {
        let api = MockPrefixApi::new().with_prefix("p1", "first", false);

        let prefix = api.get_prefix("p1").await.unwrap();
        assert_eq!(prefix.description, "first");

        api.update_prefix_description("p1", "second").await.unwrap();
        api.update_advertisement_status("p1", true).await.unwrap();

        assert_eq!(api.description("p1").as_deref(), Some("second"));
        assert!(api.advertised("p1"));
        assert_eq!(
            api.calls(),
            vec![
                MockCall::GetPrefix("p1".to_string()),
                MockCall::UpdatePrefixDescription("p1".to_string(), "second".to_string()),
                MockCall::UpdateAdvertisementStatus("p1".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let api = MockPrefixApi::new()
            .with_prefix("p1", "first", false)
            .fail_update_advertisement_status();

        let err = api.update_advertisement_status("p1", true).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert!(!api.advertised("p1"));

        let err = api.get_advertisement_status("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_tester_schema_and_types() {
        let api = Arc::new(MockPrefixApi::new());
        let tester = ProviderTester::new(IpPrefixProvider::with_client(api));

        assert!(tester.schema().resources.contains_key(RESOURCE_TYPE));
        assert_eq!(tester.resource_types(), vec![RESOURCE_TYPE.to_string()]);
        tester.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tester_validate_provider_config() {
        let tester = ProviderTester::new(IpPrefixProvider::new().with_env_lookup(|_| None));
        let err = tester
            .validate_provider_config(json!({"account_id": 7}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(_)));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_create() {
        let api = Arc::new(MockPrefixApi::new().with_prefix("p1", "first", true));
        let tester = ProviderTester::new(IpPrefixProvider::with_client(api));

        let state = tester
            .lifecycle_create(RESOURCE_TYPE, json!({"prefix_id": "p1"}))
            .await
            .unwrap();

        assert_eq!(state["id"], "p1");
        assert_eq!(state["description"], "first");
    }

    #[test]
    fn test_plan_assertions() {
        let plan = PlanResult::with_changes(
            json!({"prefix_id": "p1"}),
            vec![AttributeChange::added("prefix_id", json!("p1"))],
            false,
        );
        assert_plan_creates(&plan);
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "prefix_id");
        assert_plan_does_not_change_attribute(&plan, "description");

        assert_plan_no_changes(&PlanResult::no_change(json!({})));
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![
            Diagnostic::warning("Just a warning"),
            Diagnostic::error("Invalid value for attribute 'advertisement'"),
        ];
        assert_error_contains(&diagnostics, "Invalid value");
        assert_error_contains(&diagnostics, "advertisement");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("prefix_id"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("prefix_id"));
        assert!(display.contains("More info"));
    }
}
