//! Shared fixtures for the integration tests.
//!
//! Environments are written to a temporary project whose `main.jsonnet` files
//! hold plain JSON, which [`JsonEvaluator`] returns as the evaluation result.
//! The cluster is replaced by [`FakeConnector`], which records every call.

#![allow(dead_code)]

use std::{
	cell::RefCell,
	collections::BTreeMap,
	fs, io,
	path::PathBuf,
	sync::{Arc, Mutex},
};

use serde_json::{json, Value};
use tempfile::TempDir;
use tk_manifest::{List, Manifest, ManifestKey};
use tkenv::{
	eval::{EvalError, EvalRequest, Evaluator},
	k8s::{diff, Cluster, ClusterError, Connector, DeleteOpts},
	prompt::Confirm,
	spec::{Spec, LABEL_ENVIRONMENT},
};

/// What the evaluator was asked to do.
#[derive(Debug, Clone)]
pub struct Request {
	pub entrypoint: PathBuf,
	pub snippet: Option<String>,
	pub import_paths: Vec<PathBuf>,
	pub ext_code: BTreeMap<String, String>,
}

/// Evaluates an entrypoint by reading it as JSON.
///
/// A snippet produced for an eval pattern selects the dotted path after the
/// import from the entrypoint's data.
#[derive(Default)]
pub struct JsonEvaluator {
	pub requests: RefCell<Vec<Request>>,
}

impl JsonEvaluator {
	pub fn last(&self) -> Request {
		self.requests.borrow().last().cloned().expect("evaluator was not called")
	}
}

impl Evaluator for JsonEvaluator {
	fn evaluate(&self, request: &EvalRequest<'_>) -> Result<String, EvalError> {
		self.requests.borrow_mut().push(Request {
			entrypoint: request.entrypoint.to_path_buf(),
			snippet: request.snippet.map(str::to_string),
			import_paths: request.import_paths.to_vec(),
			ext_code: request.opts.ext_code.clone(),
		});

		let text = fs::read_to_string(request.entrypoint)?;
		let Some(snippet) = request.snippet else {
			return Ok(text);
		};

		let mut value: Value =
			serde_json::from_str(&text).map_err(|e| EvalError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
		let (_, pattern) = snippet.rsplit_once(").").expect("snippet without pattern");
		for key in pattern.split('.') {
			value = value.get(key).cloned().unwrap_or(Value::Null);
		}
		Ok(value.to_string())
	}
}

/// Fails every evaluation.
pub struct FailingEvaluator;

impl Evaluator for FailingEvaluator {
	fn evaluate(&self, _: &EvalRequest<'_>) -> Result<String, EvalError> {
		Err(EvalError::Io(io::Error::other("RUNTIME ERROR: boom")))
	}
}

/// A temporary Tanka project.
pub struct Project {
	pub dir: TempDir,
}

impl Project {
	pub fn new() -> Self {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("jsonnetfile.json"), "{}").unwrap();
		Self { dir }
	}

	/// Write an environment at `name` relative to the project root.
	pub fn env(&self, name: &str, main: &Value, spec: Option<&Value>) -> PathBuf {
		let path = self.dir.path().join(name);
		fs::create_dir_all(&path).unwrap();
		fs::write(path.join("main.jsonnet"), serde_json::to_string_pretty(main).unwrap()).unwrap();
		if let Some(spec) = spec {
			fs::write(path.join("spec.json"), serde_json::to_string_pretty(spec).unwrap()).unwrap();
		}
		path
	}
}

pub fn configmap(name: &str) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "ConfigMap",
		"metadata": { "name": name },
		"data": { "key": "value" },
	})
}

/// A `spec.json` that prune accepts.
pub fn spec_json() -> Value {
	json!({
		"apiVersion": "tanka.dev/v1alpha1",
		"kind": "Environment",
		"metadata": { "name": "default" },
		"spec": {
			"apiServer": "https://k8s.example.com:6443",
			"namespace": "apps",
			"injectLabels": true,
		},
	})
}

/// An object as the cluster returns it, labeled for the environment.
pub fn live(kind: &str, namespace: &str, name: &str, label: &str) -> Manifest {
	Manifest::new(
		json!({
			"apiVersion": "v1",
			"kind": kind,
			"metadata": {
				"name": name,
				"namespace": namespace,
				"labels": { LABEL_ENVIRONMENT: label },
			},
		}),
		".",
	)
	.unwrap()
}

/// Every call made to the fake cluster.
#[derive(Debug, Default)]
pub struct Calls {
	pub connects: usize,
	pub specs: Vec<Spec>,
	pub selectors: Vec<String>,
	pub diffs: usize,
	pub deletes: Vec<(Vec<ManifestKey>, DeleteOpts)>,
	pub closes: usize,
}

/// Which cluster call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
	#[default]
	None,
	Connect,
	List,
	Diff,
	Delete,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
	pub live: List,
	pub failure: Failure,
	pub calls: Arc<Mutex<Calls>>,
}

impl FakeConnector {
	pub fn with_live(live: List) -> Self {
		Self {
			live,
			..Self::default()
		}
	}

	pub fn failing(mut self, failure: Failure) -> Self {
		self.failure = failure;
		self
	}

	pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
		self.calls.lock().unwrap()
	}

	fn fail(&self, failure: Failure, message: &str) -> Result<(), ClusterError> {
		if self.failure == failure {
			return Err(ClusterError::Io(io::Error::other(message.to_string())));
		}
		Ok(())
	}
}

impl Connector for FakeConnector {
	type Cluster = FakeCluster;

	async fn connect(&self, spec: &Spec) -> Result<FakeCluster, ClusterError> {
		{
			let mut calls = self.calls();
			calls.connects += 1;
			calls.specs.push(spec.clone());
		}
		self.fail(Failure::Connect, "connection refused")?;
		Ok(FakeCluster {
			connector: self.clone(),
		})
	}
}

pub struct FakeCluster {
	connector: FakeConnector,
}

impl Cluster for FakeCluster {
	fn info(&self) -> String {
		"cluster 'fake' at 'https://k8s.example.com:6443', using context 'fake'".to_string()
	}

	async fn list_labeled(&self, selector: &str) -> Result<List, ClusterError> {
		self.connector.calls().selectors.push(selector.to_string());
		self.connector.fail(Failure::List, "the server is currently unable to handle the request")?;
		Ok(self.connector.live.clone())
	}

	fn diff_deleted(&self, manifests: &[Manifest]) -> Result<String, ClusterError> {
		self.connector.calls().diffs += 1;
		self.connector.fail(Failure::Diff, "diff failed")?;
		Ok(diff::static_diff(manifests)?)
	}

	async fn delete(&self, manifests: &[Manifest], opts: DeleteOpts) -> Result<(), ClusterError> {
		self.connector
			.calls()
			.deletes
			.push((manifests.iter().map(Manifest::key).collect(), opts));
		self.connector.fail(Failure::Delete, "configmaps \"stale\" is forbidden")
	}

	fn close(&mut self) {
		self.connector.calls().closes += 1;
	}
}

/// Answers confirmation prompts with a fixed reply.
pub struct ScriptedPrompt {
	pub answer: bool,
	pub asked: Vec<(String, String, String)>,
}

impl ScriptedPrompt {
	pub fn answering(answer: bool) -> Self {
		Self {
			answer,
			asked: Vec::new(),
		}
	}
}

impl Confirm for ScriptedPrompt {
	fn confirm(&mut self, action: &str, namespace: &str, info: &str) -> io::Result<bool> {
		self.asked
			.push((action.to_string(), namespace.to_string(), info.to_string()));
		Ok(self.answer)
	}
}
