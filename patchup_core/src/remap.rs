//! Ordered literal substitution of upstream build references.
//!
//! Rules are applied one after another, each as a replace-all over the whole
//! text. A broad rule may be followed by narrower rules that correct what it
//! produced, so the table is a list and never a map.

use std::fs;
use std::path::Path;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{display_path, Error, Result};

/// One `from` → `to` literal substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRule {
    /// Upstream token.
    pub from: String,
    /// Downstream replacement.
    pub to: String,
}

impl ReferenceRule {
    /// Construct a rule.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Mapping of the upstream mirror's labels, Maven coordinates and path
/// prefixes to the downstream plugin repository's.
const AOSP_RULES: &[(&str, &str)] = &[
    // upstream-relative labels
    ("//tools/adt/idea/aswb/", "//"),
    ("//tools/adt/idea/aswb:", "//:"),
    ("//tools/vendor/google/aswb/", "//"),
    ("//tools/vendor/google/aswb:", "//:"),
    ("//tools/vendor/google3/aswb/", "//"),
    ("//tools/vendor/google3/aswb:", "//:"),
    ("//third_party/intellij/bazel/plugin/", "//"),
    ("//third_party/intellij/bazel/plugin:", "//:"),
    ("//third_party/intellij/plugin/", "//"),
    ("//third_party/intellij/plugin:", "//:"),
    ("//third_party/java/auto_value", "//third_party/java/auto_value"),
    ("//third_party/java/auto:auto_value", "//third_party/java/auto_value"),
    (
        "//third_party/java/jetbrains:build_defs.bzl",
        "//intellij_platform_sdk:build_defs.bzl",
    ),
    ("//third_party/java/junit", "//third_party/java/junit"),
    ("//third_party/java/truth", "//third_party/java/truth"),
    ("//third_party/java/flogger", "//third_party/java/flogger"),
    ("//third_party/java/jetbrains/python", "//third_party/python"),
    ("//prebuilts/tools/common/m2:jsr305-2.0.1", "@jsr305_annotations//jar"),
    // plugin api
    (
        "//plugin_api:guava_for_external_binaries",
        "//intellij_platform_sdk:guava",
    ),
    ("//plugin_api:jsr305", "//intellij_platform_sdk:jsr305"),
    ("//plugin_api:test_libs", "//intellij_platform_sdk:test_libs"),
    (
        "//plugin_api:plugin_api_for_tests",
        "//intellij_platform_sdk:plugin_api_for_tests",
    ),
    (
        "//plugin_api:coverage_for_tests",
        "//intellij_platform_sdk:coverage_for_tests",
    ),
    ("//plugin_api:truth", "//intellij_platform_sdk:truth"),
    ("//plugin_api:juint", "//intellij_platform_sdk:juint"),
    (
        "//plugin_api:kotlin_for_tests",
        "//intellij_platform_sdk:kotlin_for_tests",
    ),
    ("//plugin_api:kotlin", "//intellij_platform_sdk:kotlin"),
    ("//plugin_api:terminal", "//intellij_platform_sdk:terminal"),
    ("//plugin_api:devkit", "//intellij_platform_sdk:plugin_api:devkit"),
    ("//plugin_api", "//intellij_platform_sdk:plugin_api"),
    // old-style maven imports
    ("@maven//:com.google.guava.guava", "@com_google_guava_guava//jar"),
    ("@maven//:io.grpc.grpc-protobuf-lite", "@protobuf//:protobuf_java"),
    ("@maven//:io.grpc.grpc-protobuf", "@protobuf//:protobuf_java"),
    (
        "@maven//:com.google.protobuf.protobuf-java",
        "@protobuf//:protobuf_java",
    ),
    ("@maven//:org.mockito.mockito-core", "@mockito//jar"),
    ("@maven//:com.google.code.gson.gson", "@gson//jar"),
    (
        "@maven//:com.google.errorprone.error_prone_annotations",
        "@error_prone_annotations//jar",
    ),
    // rule sets
    ("//:android.bzl", "@rules_android//rules:rules.bzl"),
    ("//tools/base/bazel:kotlin.bzl", "@rules_kotlin//kotlin:jvm.bzl"),
    // upstream path prefixes
    ("tools/adt/idea/aswb/", ""),
    ("tools/adt/idea/aswb", ""),
    (
        "tools/vendor/google3/aswb/third_party/intellij/bazel/plugin/",
        "",
    ),
    (
        "tools/vendor/google3/aswb/third_party/intellij/bazel/plugin",
        "",
    ),
    ("@com_google_protobuf//:protobuf_java", "@protobuf//:protobuf_java"),
];

/// Ordered substitution table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceTable {
    rules: Vec<ReferenceRule>,
}

impl ReferenceTable {
    /// Build a table from rules in application order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for an empty source token and
    /// [`Error::DuplicateRule`] when a source token appears twice.
    pub fn new(rules: impl IntoIterator<Item = ReferenceRule>) -> Result<Self> {
        Self::default().extend(rules)
    }

    /// The built-in table for the Android Studio mirror.
    #[must_use]
    pub fn aosp_defaults() -> Self {
        Self {
            rules: AOSP_RULES
                .iter()
                .map(|(from, to)| ReferenceRule::new(*from, *to))
                .collect(),
        }
    }

    /// Append rules after the existing ones.
    ///
    /// # Errors
    ///
    /// Same validation as [`ReferenceTable::new`], checked against the
    /// combined table.
    pub fn extend(mut self, rules: impl IntoIterator<Item = ReferenceRule>) -> Result<Self> {
        for rule in rules {
            if rule.from.is_empty() {
                return Err(Error::InvalidRule {
                    index: self.rules.len(),
                    reason: "source token is empty",
                });
            }
            if self.rules.iter().any(|existing| existing.from == rule.from) {
                return Err(Error::DuplicateRule { token: rule.from });
            }
            self.rules.push(rule);
        }
        Ok(self)
    }

    /// Rules in application order.
    #[must_use]
    pub fn rules(&self) -> &[ReferenceRule] {
        &self.rules
    }

    /// Apply every rule once, in order, over the whole text.
    #[must_use]
    pub fn remap(&self, text: &str) -> String {
        let mut current = text.to_owned();
        for rule in &self.rules {
            if current.contains(rule.from.as_str()) {
                current = current.replace(rule.from.as_str(), &rule.to);
            }
        }
        current
    }

    /// Remap every UTF-8 file below `root` in place and return how many
    /// files changed. Files that are not valid UTF-8 are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the tree cannot be walked or a file cannot
    /// be written back.
    pub fn remap_tree(&self, root: &Path) -> Result<usize> {
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        let mut changed = 0;
        for entry in walker {
            let entry = entry.map_err(|err| Error::Io {
                path: display_path(root),
                source: err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            })?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let path = entry.path();
            let Ok(text) = fs::read_to_string(path) else {
                debug!(path = %path.display(), "skipping unreadable or non-UTF-8 file");
                continue;
            };

            let remapped = self.remap(&text);
            if remapped != text {
                fs::write(path, remapped).map_err(|source| Error::Io {
                    path: display_path(path),
                    source,
                })?;
                changed += 1;
            }
        }

        info!(root = %root.display(), changed, "remapped tree");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn broad_rule_then_override_applies_in_order() {
        let table = ReferenceTable::new([
            ReferenceRule::new("//upstream/", "//"),
            ReferenceRule::new("//third_party/java/junit", "//third_party/junit"),
        ])
        .expect("valid table");

        assert_eq!(
            table.remap("deps = [\"//upstream/third_party/java/junit:junit\"]"),
            "deps = [\"//third_party/junit:junit\"]"
        );

        let reversed = ReferenceTable::new(table.rules().iter().rev().cloned()).expect("valid");
        assert_eq!(
            reversed.remap("deps = [\"//upstream/third_party/java/junit:junit\"]"),
            "deps = [\"//third_party/java/junit:junit\"]"
        );
    }

    #[test]
    fn each_rule_runs_once() {
        let table = ReferenceTable::new([ReferenceRule::new("a", "aa")]).expect("valid");
        assert_eq!(table.remap("a-a"), "aa-aa");
    }

    #[test]
    fn absent_tokens_are_noops() {
        let table = ReferenceTable::aosp_defaults();
        let text = "package com.google.idea.blaze;";
        assert_eq!(table.remap(text), text);
    }

    #[test]
    fn defaults_pass_validation() {
        let defaults = ReferenceTable::aosp_defaults();
        let rebuilt = ReferenceTable::new(defaults.rules().to_vec()).expect("valid defaults");
        assert_eq!(rebuilt, defaults);
        assert!(!defaults.rules().is_empty());
    }

    #[test]
    fn defaults_rewrite_plugin_api_labels() {
        let table = ReferenceTable::aosp_defaults();
        assert_eq!(
            table.remap("\"//plugin_api:devkit\", \"//plugin_api\""),
            "\"//intellij_platform_sdk:plugin_api:devkit\", \"//intellij_platform_sdk:plugin_api\""
        );
        assert_eq!(
            table.remap("\"//tools/adt/idea/aswb/base:base\""),
            "\"//base:base\""
        );
        assert_eq!(
            table.remap("\"@maven//:io.grpc.grpc-protobuf-lite\""),
            "\"@protobuf//:protobuf_java\""
        );
    }

    #[test]
    fn empty_and_duplicate_tokens_are_rejected() {
        let err = ReferenceTable::new([ReferenceRule::new("", "x")]).expect_err("empty");
        assert!(matches!(err, Error::InvalidRule { index: 0, .. }));

        let err = ReferenceTable::aosp_defaults()
            .extend([ReferenceRule::new("//plugin_api", "//elsewhere")])
            .expect_err("duplicate");
        assert!(matches!(err, Error::DuplicateRule { .. }));
    }

    #[test]
    fn remap_tree_rewrites_text_files_only() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("base")).expect("mkdir");
        std::fs::write(
            temp.path().join("base/BUILD"),
            "deps = [\"//plugin_api:jsr305\"]\n",
        )
        .expect("write");
        std::fs::write(temp.path().join("notes.txt"), "unrelated\n").expect("write");
        std::fs::write(temp.path().join("blob.bin"), [0xff, 0xfe, 0x00]).expect("write");

        let changed = ReferenceTable::aosp_defaults()
            .remap_tree(temp.path())
            .expect("remap tree");

        assert_eq!(changed, 1);
        let build = std::fs::read_to_string(temp.path().join("base/BUILD")).expect("read");
        assert_eq!(build, "deps = [\"//intellij_platform_sdk:jsr305\"]\n");
        let blob = std::fs::read(temp.path().join("blob.bin")).expect("read");
        assert_eq!(blob, vec![0xff, 0xfe, 0x00]);
    }
}
