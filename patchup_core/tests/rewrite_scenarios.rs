use patchup_core::{
    assemble, extract_provenance, parse_diff, render_diff, ApplyMode, CommitMetadata, DiffRewriter,
    Error, ReferenceRule, ReferenceTable, Result,
};
use patchup_core::config::PatchConfig;

const MIXED: &str = "\
diff --git a/aswb/src/Foo.java b/aswb/src/Foo.java
index 3b18e51..a042389 100644
--- a/aswb/src/Foo.java
+++ b/aswb/src/Foo.java
@@ -1,3 +1,4 @@
 class Foo {
+  // see //tools/adt/idea/aswb/base:base
   int x;
 }
diff --git a/other/Bar.java b/other/Bar.java
index 1111111..2222222 100644
--- a/other/Bar.java
+++ b/other/Bar.java
@@ -1 +1 @@
-class Bar {}
+class Bar { }
";

const RENAME: &str = "\
diff --git a/plugin-root/a.txt b/plugin-root/b.txt
similarity index 100%
rename from plugin-root/a.txt
rename to plugin-root/b.txt
";

#[test]
fn subtree_file_is_kept_and_outside_file_dropped() -> Result<()> {
    let table = ReferenceTable::aosp_defaults();
    let rewriter = DiffRewriter::new("aswb", &table);

    for mode in [ApplyMode::ThreeWay, ApplyMode::Reject] {
        let text = rewriter.rewrite_text(MIXED, mode)?;
        assert_eq!(
            text,
            "\
diff --git a/src/Foo.java b/src/Foo.java
index 3b18e51..a042389 100644
--- a/src/Foo.java
+++ b/src/Foo.java
@@ -1,3 +1,4 @@
 class Foo {
+  // see //base:base
   int x;
 }
"
        );
        assert!(!text.contains("Bar.java"));
    }
    Ok(())
}

#[test]
fn rename_paths_follow_apply_mode() -> Result<()> {
    let table = ReferenceTable::default();
    let rewriter = DiffRewriter::new("plugin-root", &table);
    let diff = parse_diff(RENAME)?;

    let reject = rewriter.rewrite(&diff, ApplyMode::Reject);
    assert!(reject.starts_with("diff --git a/a.txt b/b.txt\n"));
    assert!(reject.contains("rename from a.txt\n"));
    assert!(reject.contains("rename to b.txt\n"));

    let three_way = rewriter.rewrite(&diff, ApplyMode::ThreeWay);
    assert!(three_way.starts_with("diff --git a/plugin-root/a.txt b/b.txt\n"));
    assert!(three_way.contains("rename from plugin-root/a.txt\n"));
    assert!(three_way.contains("rename to b.txt\n"));
    Ok(())
}

#[test]
fn deletions_strip_both_sides_in_every_mode() -> Result<()> {
    let table = ReferenceTable::default();
    let rewriter = DiffRewriter::new("aswb", &table);
    let text = "\
diff --git a/aswb/gone.txt b/aswb/gone.txt
deleted file mode 100644
index ce01362..0000000
--- a/aswb/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-hello
";

    for mode in [ApplyMode::ThreeWay, ApplyMode::Reject] {
        let rewritten = rewriter.rewrite_text(text, mode)?;
        assert!(rewritten.starts_with("diff --git a/gone.txt b/gone.txt\n"));
        assert!(rewritten.contains("--- a/gone.txt\n+++ /dev/null\n"));
    }
    Ok(())
}

#[test]
fn configured_rules_override_earlier_broad_rules() -> Result<()> {
    let table = ReferenceTable::aosp_defaults().extend([ReferenceRule::new(
        "//intellij_platform_sdk:plugin_api:devkit",
        "//intellij_platform_sdk:devkit",
    )])?;
    let rewriter = DiffRewriter::new("aswb", &table);
    let text = "\
diff --git a/aswb/BUILD b/aswb/BUILD
--- a/aswb/BUILD
+++ b/aswb/BUILD
@@ -1 +1 @@
-deps = []
+deps = [\"//plugin_api:devkit\"]
";

    let rewritten = rewriter.rewrite_text(text, ApplyMode::ThreeWay)?;
    assert!(rewritten.contains("+deps = [\"//intellij_platform_sdk:devkit\"]\n"));
    Ok(())
}

#[test]
fn untouched_diff_round_trips_through_parser() -> Result<()> {
    let diff = parse_diff(MIXED)?;
    assert_eq!(render_diff(&diff), MIXED);
    assert_eq!(diff.stats().additions, 2);
    Ok(())
}

#[test]
fn malformed_diff_is_reported_with_line() {
    let err = parse_diff("not a diff\n").expect_err("malformed");
    assert!(matches!(err, Error::MalformedDiff { line: 1, .. }));
}

#[test]
fn assembled_patch_records_provenance_once() -> Result<()> {
    let table = ReferenceTable::aosp_defaults();
    let rewriter = DiffRewriter::new("aswb", &table);
    let metadata = CommitMetadata::new("0123abcd", "Teach Foo a comment")
        .with_body("Upstream change.\n\nAOSP: deadbeef\n");

    let body = rewriter.rewrite_text(MIXED, ApplyMode::ThreeWay)?;
    let patch = assemble(&metadata, &body, &PatchConfig::default());

    assert!(patch.starts_with("From 0123abcd Mon Sep 17 00:00:00 2001\n"));
    assert!(patch.contains("\nSubject: [PATCH] Teach Foo a comment\n"));
    assert_eq!(extract_provenance(&patch, "AOSP")?, "0123abcd");
    assert!(patch.ends_with(&body));
    Ok(())
}
