// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a builder that lays out view and layout files in a temporary directory

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use stencil::template::{ViewConfig, ViewEngine};

pub struct TestViewsBuilder {
    extension: String,
    views: Vec<(String, String)>,
    layouts: Vec<(String, String)>,
}

impl TestViewsBuilder {
    pub fn new() -> Self {
        Self {
            extension: "html".to_string(),
            views: Vec::new(),
            layouts: Vec::new(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    pub fn with_view(mut self, name: &str, source: &str) -> Self {
        self.views.push((name.to_string(), source.to_string()));
        self
    }

    pub fn with_layout(mut self, name: &str, source: &str) -> Self {
        self.layouts.push((name.to_string(), source.to_string()));
        self
    }

    pub async fn build(self) -> TestViews {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("views");

        for (name, source) in &self.views {
            write_file(&root.join(format!("{}.{}", name, self.extension)), source).await;
        }
        for (name, source) in &self.layouts {
            write_file(
                &root.join("layouts").join(format!("{}.{}", name, self.extension)),
                source,
            )
            .await;
        }

        TestViews { temp_dir, root }
    }
}

pub struct TestViews {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestViews {
    pub fn config(&self) -> ViewConfig {
        ViewConfig::new(&self.root)
    }

    pub fn engine(&self) -> ViewEngine {
        ViewEngine::new(self.config()).expect("Failed to create view engine")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn write(&self, relative: &str, source: &str) {
        write_file(&self.path(relative), source).await;
    }

    pub async fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative))
            .await
            .expect("Failed to remove view file");
    }
}

async fn write_file(path: &Path, source: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .expect("Failed to create view directory");
    }
    fs::write(path, source).await.expect("Failed to write view file");
}
