//! Shared fixtures for integration tests

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use mdg_init::{InitConfig, InitialisationReporter, InitialisationTask, Metrics, WorkspacePaths};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Reporter that records every call for later assertions
#[derive(Default)]
pub struct RecordingReporter {
    pub progress: Mutex<Vec<(u8, String)>>,
    pub critical: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn percents(&self) -> Vec<u8> {
        self.progress.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    pub fn critical_reports(&self) -> Vec<(String, String)> {
        self.critical.lock().unwrap().clone()
    }
}

impl InitialisationReporter for RecordingReporter {
    fn progress(&self, percent: u8, label: &str) {
        self.progress.lock().unwrap().push((percent, label.to_string()));
    }

    fn critical(&self, title: &str, message: &str) {
        self.critical
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

pub fn create_test_workspace() -> (TempDir, WorkspacePaths) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let paths = WorkspacePaths::new(root);
    fs::create_dir_all(paths.test_mod_path.parent().unwrap()).unwrap();
    fs::write(&paths.test_mod_path, b"PK\x03\x04fixture").unwrap();
    (temp_dir, paths)
}

pub fn create_task(paths: &WorkspacePaths) -> InitialisationTask {
    InitialisationTask::new(paths.clone(), Arc::new(Metrics::new()))
}

/// Cache enabled, both stages on, decompiler check off
pub fn cached_config() -> InitConfig {
    InitConfig {
        cache_enabled: true,
        deobfuscation_stage_enabled: true,
        decompilation_stage_enabled: true,
        decompiler_validation_enabled: false,
        ..InitConfig::default()
    }
}

pub fn touch(path: &Utf8Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"x").unwrap();
}

pub fn entries(path: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Every path under `root`, relative and sorted, directories suffixed with `/`
pub fn tree(root: &Utf8Path) -> Vec<String> {
    fn walk(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<String>) {
        for entry in dir.read_dir_utf8().unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap().to_string();
            if path.is_dir() {
                out.push(format!("{}/", relative));
                walk(root, path, out);
            } else {
                out.push(relative);
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
