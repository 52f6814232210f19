//! In-memory stand-ins for the four capabilities. Each fake records the
//! calls it receives as `op:detail` strings and can be told to fail the next
//! call of a given operation.

use crate::apigateway::{Deployment, GatewayApi, RestApi, RestApiPage};
use crate::client::ByteStream;
use crate::error::{AwsError, AwsResult};
use crate::iam::{IdentityApi, Role, RolePolicyPage};
use crate::lambda::{
    AddPermissionRequest, ComputeApi, CreateFunctionRequest, FunctionConfiguration, UpdateConfigurationRequest,
};
use crate::logs::{FilterLogEventsPage, LogsApi, RawLogEvent};
use crate::registry::{Capability, ClientFactory};
use crate::tags::TagSet;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

pub const ACCOUNT_ID: &str = "123456789012";

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<AwsError>>>,
}

impl Recorder {
    fn record(&self, op: &str, detail: &str) -> AwsResult<()> {
        let entry = if detail.is_empty() {
            op.to_string()
        } else {
            format!("{}:{}", op, detail)
        };
        self.calls.lock().unwrap().push(entry);
        match self.failures.lock().unwrap().get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail_next(&self, op: &str, err: AwsError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, op: &str) -> usize {
        let prefix = format!("{}:", op);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&prefix))
            .count()
    }
}

/// Offset-based paging shared by the list fakes. Markers are stringified
/// offsets.
fn page<T: Clone>(items: &[T], marker: Option<&str>, size: usize) -> (Vec<T>, Option<String>) {
    let start = marker.and_then(|m| m.parse::<usize>().ok()).unwrap_or(0).min(items.len());
    let end = (start + size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    (items[start..end].to_vec(), next)
}

// ── Compute ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct ComputeState {
    functions: BTreeMap<String, FunctionConfiguration>,
    tags: HashMap<String, TagSet>,
    created: Vec<CreateFunctionRequest>,
    configuration_updates: Vec<UpdateConfigurationRequest>,
    tagged: Vec<(String, TagSet)>,
    untagged: Vec<(String, Vec<String>)>,
    permissions: Vec<(String, AddPermissionRequest)>,
}

#[derive(Default)]
pub struct FakeCompute {
    recorder: Recorder,
    state: Mutex<ComputeState>,
}

pub fn function_arn(name: &str) -> String {
    format!("arn:aws:lambda:us-west-2:{}:function:{}", ACCOUNT_ID, name)
}

fn function_not_found(name: &str) -> AwsError {
    AwsError::new(
        "lambda",
        "ResourceNotFoundException",
        &format!("Function not found: {}", function_arn(name)),
        404,
    )
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_function(&self, name: &str) -> String {
        let config = FunctionConfiguration {
            function_name: name.to_string(),
            function_arn: function_arn(name),
            runtime: Some("python3.12".to_string()),
            handler: Some("app.app".to_string()),
            ..Default::default()
        };
        self.state.lock().unwrap().functions.insert(name.to_string(), config);
        function_arn(name)
    }

    pub fn set_tags(&self, arn: &str, tags: TagSet) {
        self.state.lock().unwrap().tags.insert(arn.to_string(), tags);
    }

    pub fn tags_of(&self, arn: &str) -> TagSet {
        self.state.lock().unwrap().tags.get(arn).cloned().unwrap_or_default()
    }

    pub fn fail_next(&self, op: &str, err: AwsError) {
        self.recorder.fail_next(op, err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }

    pub fn count(&self, op: &str) -> usize {
        self.recorder.count(op)
    }

    pub fn created(&self) -> Vec<CreateFunctionRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn configuration_updates(&self) -> Vec<UpdateConfigurationRequest> {
        self.state.lock().unwrap().configuration_updates.clone()
    }

    pub fn tagged(&self) -> Vec<(String, TagSet)> {
        self.state.lock().unwrap().tagged.clone()
    }

    pub fn untagged(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().untagged.clone()
    }

    pub fn permissions(&self) -> Vec<(String, AddPermissionRequest)> {
        self.state.lock().unwrap().permissions.clone()
    }

    fn existing(&self, name: &str) -> AwsResult<FunctionConfiguration> {
        self.state
            .lock()
            .unwrap()
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| function_not_found(name))
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_function(&self, name: &str) -> AwsResult<FunctionConfiguration> {
        self.recorder.record("get_function", name)?;
        self.existing(name)
    }

    async fn get_function_configuration(&self, name: &str) -> AwsResult<FunctionConfiguration> {
        self.recorder.record("get_function_configuration", name)?;
        self.existing(name)
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> AwsResult<FunctionConfiguration> {
        self.recorder.record("create_function", &request.function_name)?;
        let config = FunctionConfiguration {
            function_name: request.function_name.clone(),
            function_arn: function_arn(&request.function_name),
            runtime: Some(request.runtime.clone()),
            role: Some(request.role.clone()),
            handler: Some(request.handler.clone()),
            timeout: request.timeout,
            memory_size: request.memory_size,
            ..Default::default()
        };
        let mut state = self.state.lock().unwrap();
        state.created.push(request.clone());
        state.functions.insert(request.function_name.clone(), config.clone());
        if let Some(ref tags) = request.tags {
            state.tags.insert(config.function_arn.clone(), tags.clone());
        }
        Ok(config)
    }

    async fn update_function_code(&self, name: &str, _zip_contents: &[u8]) -> AwsResult<FunctionConfiguration> {
        self.recorder.record("update_function_code", name)?;
        self.existing(name)
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        request: &UpdateConfigurationRequest,
    ) -> AwsResult<FunctionConfiguration> {
        self.recorder.record("update_function_configuration", name)?;
        let existing = self.existing(name)?;
        self.state.lock().unwrap().configuration_updates.push(request.clone());
        Ok(existing)
    }

    async fn delete_function(&self, name: &str) -> AwsResult<()> {
        self.recorder.record("delete_function", name)?;
        match self.state.lock().unwrap().functions.remove(name) {
            Some(_) => Ok(()),
            None => Err(function_not_found(name)),
        }
    }

    async fn list_tags(&self, arn: &str) -> AwsResult<TagSet> {
        self.recorder.record("list_tags", arn)?;
        Ok(self.tags_of(arn))
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> AwsResult<()> {
        self.recorder.record("tag_resource", arn)?;
        let mut state = self.state.lock().unwrap();
        state.tagged.push((arn.to_string(), tags.clone()));
        state.tags.entry(arn.to_string()).or_default().extend(tags.clone());
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> AwsResult<()> {
        self.recorder.record("untag_resource", arn)?;
        let mut state = self.state.lock().unwrap();
        state.untagged.push((arn.to_string(), keys.to_vec()));
        if let Some(current) = state.tags.get_mut(arn) {
            for key in keys {
                current.remove(key);
            }
        }
        Ok(())
    }

    async fn get_policy(&self, name: &str) -> AwsResult<String> {
        self.recorder.record("get_policy", name)?;
        let state = self.state.lock().unwrap();
        let statements: Vec<serde_json::Value> = state
            .permissions
            .iter()
            .filter(|(function, _)| function == name)
            .map(|(_, grant)| {
                serde_json::json!({
                    "Sid": grant.statement_id,
                    "Effect": "Allow",
                    "Principal": {"Service": grant.principal},
                    "Action": grant.action,
                    "Resource": function_arn(name),
                    "Condition": {"ArnLike": {"AWS:SourceArn": grant.source_arn}},
                })
            })
            .collect();
        if statements.is_empty() {
            return Err(AwsError::new(
                "lambda",
                "ResourceNotFoundException",
                "The resource you requested does not exist.",
                404,
            ));
        }
        Ok(serde_json::json!({"Version": "2012-10-17", "Id": "default", "Statement": statements}).to_string())
    }

    async fn add_permission(&self, name: &str, request: &AddPermissionRequest) -> AwsResult<()> {
        self.recorder.record("add_permission", name)?;
        self.state
            .lock()
            .unwrap()
            .permissions
            .push((name.to_string(), request.clone()));
        Ok(())
    }
}

// ── Identity ────────────────────────────────────────────────────────────

#[derive(Default)]
struct IdentityState {
    roles: BTreeMap<String, Role>,
    /// Inline policies per role, in insertion order.
    policies: BTreeMap<String, Vec<(String, String)>>,
}

pub struct FakeIdentity {
    recorder: Recorder,
    state: Mutex<IdentityState>,
    page_size: usize,
}

fn no_such_role(name: &str) -> AwsError {
    AwsError::new(
        "iam",
        "NoSuchEntity",
        &format!("The role with name {} cannot be found.", name),
        404,
    )
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            recorder: Recorder::default(),
            state: Mutex::new(IdentityState::default()),
            page_size,
        }
    }

    pub fn seed_role(&self, name: &str, policy_names: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.roles.insert(name.to_string(), role(name));
        state.policies.insert(
            name.to_string(),
            policy_names.iter().map(|p| (p.to_string(), "{}".to_string())).collect(),
        );
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.state.lock().unwrap().roles.contains_key(name)
    }

    pub fn policy_document(&self, role_name: &str, policy_name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(role_name)?
            .iter()
            .find(|(name, _)| name == policy_name)
            .map(|(_, doc)| doc.clone())
    }

    pub fn fail_next(&self, op: &str, err: AwsError) {
        self.recorder.fail_next(op, err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }
}

fn role(name: &str) -> Role {
    Role {
        role_name: name.to_string(),
        role_id: format!("AROA{}", name.len()),
        arn: format!("arn:aws:iam::{}:role/{}", ACCOUNT_ID, name),
        path: "/".to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn create_role(&self, role_name: &str, _trust_policy: &str) -> AwsResult<Role> {
        self.recorder.record("create_role", role_name)?;
        let mut state = self.state.lock().unwrap();
        if state.roles.contains_key(role_name) {
            return Err(AwsError::new(
                "iam",
                "EntityAlreadyExists",
                &format!("Role with name {} already exists.", role_name),
                409,
            ));
        }
        let created = role(role_name);
        state.roles.insert(role_name.to_string(), created.clone());
        state.policies.entry(role_name.to_string()).or_default();
        Ok(created)
    }

    async fn get_role(&self, role_name: &str) -> AwsResult<Role> {
        self.recorder.record("get_role", role_name)?;
        self.state
            .lock()
            .unwrap()
            .roles
            .get(role_name)
            .cloned()
            .ok_or_else(|| no_such_role(role_name))
    }

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()> {
        self.recorder
            .record("put_role_policy", &format!("{}:{}", role_name, policy_name))?;
        let mut state = self.state.lock().unwrap();
        if !state.roles.contains_key(role_name) {
            return Err(no_such_role(role_name));
        }
        let policies = state.policies.entry(role_name.to_string()).or_default();
        policies.retain(|(name, _)| name != policy_name);
        policies.push((policy_name.to_string(), document.to_string()));
        Ok(())
    }

    async fn list_role_policies(&self, role_name: &str, marker: Option<&str>) -> AwsResult<RolePolicyPage> {
        self.recorder.record("list_role_policies", role_name)?;
        let state = self.state.lock().unwrap();
        let names: Vec<String> = state
            .policies
            .get(role_name)
            .ok_or_else(|| no_such_role(role_name))?
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let (policy_names, marker) = page(&names, marker, self.page_size);
        Ok(RolePolicyPage { policy_names, marker })
    }

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        self.recorder
            .record("delete_role_policy", &format!("{}:{}", role_name, policy_name))?;
        let mut state = self.state.lock().unwrap();
        let policies = state.policies.get_mut(role_name).ok_or_else(|| no_such_role(role_name))?;
        let before = policies.len();
        policies.retain(|(name, _)| name != policy_name);
        if policies.len() == before {
            return Err(AwsError::new(
                "iam",
                "NoSuchEntity",
                &format!("The role policy with name {} cannot be found.", policy_name),
                404,
            ));
        }
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        self.recorder.record("delete_role", role_name)?;
        let mut state = self.state.lock().unwrap();
        if state.policies.get(role_name).map_or(false, |p| !p.is_empty()) {
            return Err(AwsError::new(
                "iam",
                "DeleteConflict",
                "Cannot delete entity, must delete policies first.",
                409,
            ));
        }
        state.policies.remove(role_name);
        state.roles.remove(role_name).map(|_| ()).ok_or_else(|| no_such_role(role_name))
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct GatewayState {
    apis: Vec<RestApi>,
    definitions: HashMap<String, serde_json::Value>,
    deployments: usize,
    imported: usize,
    sdk: Option<Vec<u8>>,
}

pub struct FakeGateway {
    recorder: Recorder,
    state: Mutex<GatewayState>,
    page_size: usize,
}

fn api_not_found(id: &str) -> AwsError {
    AwsError::new(
        "apigateway",
        "NotFoundException",
        &format!("Invalid API identifier specified {}:{}", ACCOUNT_ID, id),
        404,
    )
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::with_page_size(25)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            recorder: Recorder::default(),
            state: Mutex::new(GatewayState::default()),
            page_size,
        }
    }

    pub fn seed_api(&self, id: &str, name: &str) {
        self.state.lock().unwrap().apis.push(RestApi {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        });
    }

    pub fn set_sdk(&self, zip: Vec<u8>) {
        self.state.lock().unwrap().sdk = Some(zip);
    }

    pub fn definition(&self, id: &str) -> Option<serde_json::Value> {
        self.state.lock().unwrap().definitions.get(id).cloned()
    }

    pub fn fail_next(&self, op: &str, err: AwsError) {
        self.recorder.fail_next(op, err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }

    pub fn count(&self, op: &str) -> usize {
        self.recorder.count(op)
    }

    fn find(&self, id: &str) -> AwsResult<RestApi> {
        self.state
            .lock()
            .unwrap()
            .apis
            .iter()
            .find(|api| api.id == id)
            .cloned()
            .ok_or_else(|| api_not_found(id))
    }
}

#[async_trait]
impl GatewayApi for FakeGateway {
    async fn get_rest_apis(&self, position: Option<&str>) -> AwsResult<RestApiPage> {
        self.recorder.record("get_rest_apis", position.unwrap_or(""))?;
        let state = self.state.lock().unwrap();
        let (items, position) = page(&state.apis, position, self.page_size);
        Ok(RestApiPage { items, position })
    }

    async fn get_rest_api(&self, rest_api_id: &str) -> AwsResult<RestApi> {
        self.recorder.record("get_rest_api", rest_api_id)?;
        self.find(rest_api_id)
    }

    async fn import_rest_api(&self, definition: &serde_json::Value) -> AwsResult<RestApi> {
        self.recorder.record("import_rest_api", "")?;
        let mut state = self.state.lock().unwrap();
        state.imported += 1;
        let api = RestApi {
            id: format!("api{}", state.imported),
            name: definition["info"]["title"].as_str().unwrap_or_default().to_string(),
            ..Default::default()
        };
        state.apis.push(api.clone());
        state.definitions.insert(api.id.clone(), definition.clone());
        Ok(api)
    }

    async fn put_rest_api(&self, rest_api_id: &str, definition: &serde_json::Value) -> AwsResult<RestApi> {
        self.recorder.record("put_rest_api", rest_api_id)?;
        let api = self.find(rest_api_id)?;
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert(rest_api_id.to_string(), definition.clone());
        Ok(api)
    }

    async fn delete_rest_api(&self, rest_api_id: &str) -> AwsResult<()> {
        self.recorder.record("delete_rest_api", rest_api_id)?;
        let mut state = self.state.lock().unwrap();
        let before = state.apis.len();
        state.apis.retain(|api| api.id != rest_api_id);
        if state.apis.len() == before {
            return Err(api_not_found(rest_api_id));
        }
        state.definitions.remove(rest_api_id);
        Ok(())
    }

    async fn create_deployment(&self, rest_api_id: &str, stage_name: &str) -> AwsResult<Deployment> {
        self.recorder
            .record("create_deployment", &format!("{}:{}", rest_api_id, stage_name))?;
        self.find(rest_api_id)?;
        let mut state = self.state.lock().unwrap();
        state.deployments += 1;
        Ok(Deployment {
            id: format!("dep{}", state.deployments),
            ..Default::default()
        })
    }

    async fn get_sdk(&self, rest_api_id: &str, stage_name: &str, sdk_type: &str) -> AwsResult<ByteStream> {
        self.recorder
            .record("get_sdk", &format!("{}:{}:{}", rest_api_id, stage_name, sdk_type))?;
        let zip = self
            .state
            .lock()
            .unwrap()
            .sdk
            .clone()
            .ok_or_else(|| api_not_found(rest_api_id))?;
        // Small chunks so the download loop sees more than one.
        let chunks: Vec<AwsResult<Bytes>> = zip.chunks(64).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

// ── Logs ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLogs {
    pages: Mutex<Vec<Vec<RawLogEvent>>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl FakeLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<Vec<RawLogEvent>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn push_page(&self, events: Vec<RawLogEvent>) {
        self.pages.lock().unwrap().push(events);
    }

    pub fn requested_tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogsApi for FakeLogs {
    async fn filter_log_events(
        &self,
        _log_group_name: &str,
        _interleaved: bool,
        next_token: Option<&str>,
    ) -> AwsResult<FilterLogEventsPage> {
        self.tokens.lock().unwrap().push(next_token.map(String::from));
        let pages = self.pages.lock().unwrap();
        let index = next_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        Ok(FilterLogEventsPage {
            events: pages.get(index).cloned().unwrap_or_default(),
            next_token: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
        })
    }
}

// ── Factory ─────────────────────────────────────────────────────────────

/// Which handles a [`FakeFactory`] was asked to build, shared with the test.
#[derive(Clone, Default)]
pub struct BuildLog(Arc<Mutex<Vec<Capability>>>);

impl BuildLog {
    fn push(&self, capability: Capability) {
        self.0.lock().unwrap().push(capability);
    }

    pub fn count(&self, capability: Capability) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == capability).count()
    }
}

/// Hands out the same fakes every time so tests can inspect them.
pub struct FakeFactory {
    pub compute: Arc<FakeCompute>,
    pub identity: Arc<FakeIdentity>,
    pub gateway: Arc<FakeGateway>,
    pub logs: Arc<FakeLogs>,
    built: BuildLog,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            compute: Arc::new(FakeCompute::new()),
            identity: Arc::new(FakeIdentity::new()),
            gateway: Arc::new(FakeGateway::new()),
            logs: Arc::new(FakeLogs::new()),
            built: BuildLog::default(),
        }
    }

    pub fn built(&self) -> BuildLog {
        self.built.clone()
    }
}

impl ClientFactory for FakeFactory {
    fn compute(&self) -> Arc<dyn ComputeApi> {
        self.built.push(Capability::Compute);
        self.compute.clone()
    }

    fn identity(&self) -> Arc<dyn IdentityApi> {
        self.built.push(Capability::Identity);
        self.identity.clone()
    }

    fn gateway(&self) -> Arc<dyn GatewayApi> {
        self.built.push(Capability::Gateway);
        self.gateway.clone()
    }

    fn logs(&self) -> Arc<dyn LogsApi> {
        self.built.push(Capability::Logs);
        self.logs.clone()
    }
}

/// Zip archive holding `files` (path, contents), stored uncompressed.
pub fn zip_fixture(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (path, contents) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
