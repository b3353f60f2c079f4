#![allow(dead_code)]
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanSection {
    pub ports: Option<String>,
    pub port_min: Option<u16>,
    pub port_max: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub qps: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct RunSection {
    pub host: Option<String>,
    pub ports: Option<String>,
    pub port_min: Option<u16>,
    pub port_max: Option<u16>,
    pub log: Option<String>,
    pub concurrency: Option<usize>,
    pub request_timeout_ms: Option<u64>,
    pub invalid_status: Option<u16>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanSection>,
    pub run: Option<RunSection>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("apiprobe.yaml");
            if p.exists() {
                p.to_path_buf()
            } else {
                return None;
            }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
