//! Test corpus assembly from discovered and mined endpoint data.

use payload_synth::{is_mutating, synthesize};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use trace_mine::MinedEndpoint;

/// One concrete request to execute, with its expected outcome. Immutable once
/// built; the expected status is a heuristic about the target, not a promise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub endpoint: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub expected_status: u16,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub negative: bool,
}

/// Per-path knowledge feeding the builder: supported methods plus any
/// historically observed payload per method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointSpec {
    pub methods: Vec<String>,
    pub templates: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Expected status for the truncated-body negative case. Whether the
    /// target actually enforces required fields is an assumption about the
    /// target, so this is overridable.
    pub invalid_status: u16,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions { invalid_status: 400 }
    }
}

/// Status a well-formed request is assumed to earn. Pure lookup table.
pub fn expected_status(method: &str) -> u16 {
    match method {
        "POST" => 201,
        "DELETE" => 204,
        _ => 200,
    }
}

/// Combine live-probe methods with mined methods and templates, keyed by
/// path. Mined templates reflect requests the target actually accepted, so
/// they are authoritative over anything synthesized later.
pub fn merge(
    probed: &BTreeMap<String, Vec<String>>,
    mined: Option<&BTreeMap<String, MinedEndpoint>>,
) -> BTreeMap<String, EndpointSpec> {
    let mut out: BTreeMap<String, EndpointSpec> = BTreeMap::new();
    for (path, methods) in probed {
        let spec = out.entry(path.clone()).or_default();
        for m in methods {
            if !spec.methods.contains(m) {
                spec.methods.push(m.clone());
            }
        }
    }
    if let Some(mined) = mined {
        for (path, endpoint) in mined {
            let spec = out.entry(path.clone()).or_default();
            for m in &endpoint.methods {
                if !spec.methods.contains(m) {
                    spec.methods.push(m.clone());
                }
            }
            for (m, body) in &endpoint.templates {
                spec.templates.insert(m.clone(), body.clone());
            }
        }
    }
    out
}

/// Expand endpoint knowledge into an ordered corpus: one case per
/// (path, method), an exploratory single-resource GET for collection paths,
/// and one truncated-body negative per POST that carried a body. Derived
/// cases immediately follow their parent.
pub fn build(endpoints: &BTreeMap<String, EndpointSpec>, opts: &BuildOptions) -> Vec<TestCase> {
    let mut cases = Vec::new();
    for (path, spec) in endpoints {
        for method in &spec.methods {
            let data = match spec.templates.get(method) {
                Some(template) => Some(template.clone()),
                None if is_mutating(method) => Some(synthesize(path, method)),
                None => None,
            };
            cases.push(TestCase {
                endpoint: path.clone(),
                method: method.clone(),
                data: data.clone(),
                expected_status: expected_status(method),
                name: format!("{method} {path}"),
                description: format!("exercise {method} {path}"),
                negative: false,
            });

            if method == "GET" && !path.ends_with('/') {
                let single = format!("{path}/1");
                cases.push(TestCase {
                    endpoint: single.clone(),
                    method: "GET".to_string(),
                    data: None,
                    expected_status: 200,
                    name: format!("GET {single}"),
                    description: format!("fetch a single resource from {path}"),
                    negative: false,
                });
            }

            if method == "POST" {
                if let Some(Value::Object(body)) = &data {
                    let truncated: serde_json::Map<String, Value> = body
                        .iter()
                        .take(1)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    cases.push(TestCase {
                        endpoint: path.clone(),
                        method: "POST".to_string(),
                        data: Some(Value::Object(truncated)),
                        expected_status: opts.invalid_status,
                        name: format!("POST {path} (incomplete body)"),
                        description: format!("POST {path} with required fields stripped"),
                        negative: true,
                    });
                }
            }
        }
    }
    cases
}
