//! Loading manifests from local dry repositories.
//!
//! Each case gets an isolated `TempDir` repository.

use hydra_source::{detect_source_kind, load_manifests, resolve_revision, SourceError, SourceKind};
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_repo() -> TempDir {
    TempDir::new().expect("tempdir")
}

fn write(repo: &TempDir, rel: &str, content: &str) {
    let path = repo.path().join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write fixture");
}

fn url(repo: &TempDir) -> String {
    repo.path().to_string_lossy().into_owned()
}

fn kinds(objects: &[serde_json::Value]) -> Vec<&str> {
    objects.iter().map(|o| o["kind"].as_str().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

#[rstest]
#[case("kustomization.yaml", SourceKind::Kustomize)]
#[case("kustomization.yml", SourceKind::Kustomize)]
#[case("Kustomization", SourceKind::Kustomize)]
#[case("Chart.yaml", SourceKind::Helm)]
#[case("deploy.yaml", SourceKind::Directory)]
fn source_kind_detection(#[case] indicator: &str, #[case] expected: SourceKind) {
    let repo = make_repo();
    write(&repo, &format!("app/{indicator}"), "kind: Whatever\n");
    assert_eq!(detect_source_kind(&repo.path().join("app")), expected);
}

#[rstest]
#[case("kustomization.yaml", "kustomize")]
#[case("Chart.yaml", "helm")]
fn rendered_sources_are_unsupported(#[case] indicator: &str, #[case] kind: &str) {
    let repo = make_repo();
    write(&repo, &format!("app/{indicator}"), "name: app\n");
    let err = load_manifests(&url(&repo), "app").unwrap_err();
    match err {
        SourceError::UnsupportedSource { kind: got, .. } => assert_eq!(got, kind),
        other => panic!("expected unsupported source, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Directory sources
// ---------------------------------------------------------------------------

#[test]
fn files_are_read_recursively_in_sorted_order() {
    let repo = make_repo();
    write(&repo, "app/b-service.yaml", "kind: Service\napiVersion: v1\n");
    write(&repo, "app/a-deploy.yml", "kind: Deployment\napiVersion: apps/v1\n");
    write(&repo, "app/nested/config.json", r#"{"kind": "ConfigMap", "apiVersion": "v1"}"#);
    write(&repo, "app/README.md", "# not a manifest\n");

    let objects = load_manifests(&url(&repo), "app").expect("load");
    assert_eq!(kinds(&objects), vec!["Deployment", "Service", "ConfigMap"]);
}

#[test]
fn multi_document_yaml_drops_empty_documents() {
    let repo = make_repo();
    write(
        &repo,
        "app/all.yaml",
        "---\nkind: Namespace\nmetadata:\n  name: prod\n---\n---\nkind: ServiceAccount\n",
    );
    let objects = load_manifests(&url(&repo), "app").expect("load");
    assert_eq!(kinds(&objects), vec!["Namespace", "ServiceAccount"]);
    assert_eq!(objects[0]["metadata"]["name"], "prod");
}

#[test]
fn hidden_directories_are_skipped() {
    let repo = make_repo();
    write(&repo, "app/deploy.yaml", "kind: Deployment\n");
    write(&repo, "app/.cache/stale.yaml", "kind: Stale\n");
    let objects = load_manifests(&url(&repo), "app").expect("load");
    assert_eq!(kinds(&objects), vec!["Deployment"]);
}

#[test]
fn empty_path_reads_repository_root() {
    let repo = make_repo();
    write(&repo, "deploy.yaml", "kind: Deployment\n");
    let objects = load_manifests(&format!("file://{}", url(&repo)), "").expect("load");
    assert_eq!(kinds(&objects), vec!["Deployment"]);
}

#[rstest]
#[case("- just\n- a\n- list\n", "not a mapping")]
#[case("metadata:\n  name: x\n", "missing 'kind'")]
fn invalid_documents_are_rejected(#[case] content: &str, #[case] reason: &str) {
    let repo = make_repo();
    write(&repo, "app/bad.yaml", content);
    let err = load_manifests(&url(&repo), "app").unwrap_err();
    assert!(matches!(err, SourceError::InvalidManifest { .. }), "{err}");
    assert!(err.to_string().contains(reason), "{err}");
    assert!(err.to_string().contains("bad.yaml"));
}

#[test]
fn malformed_yaml_reports_file() {
    let repo = make_repo();
    write(&repo, "app/broken.yaml", "kind: [unclosed\n");
    let err = load_manifests(&url(&repo), "app").unwrap_err();
    assert!(matches!(err, SourceError::Parse { .. }));
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn missing_and_escaping_paths_are_errors() {
    let repo = make_repo();
    write(&repo, "app/deploy.yaml", "kind: Deployment\n");
    assert!(matches!(
        load_manifests(&url(&repo), "other"),
        Err(SourceError::PathNotFound { .. })
    ));
    assert!(matches!(
        load_manifests(&url(&repo), "../"),
        Err(SourceError::PathEscape { .. })
    ));
}

#[test]
fn revision_tracks_manifest_edits() {
    let repo = make_repo();
    write(&repo, "app/deploy.yaml", "kind: Deployment\n");
    let before = resolve_revision(&url(&repo), "main").expect("resolve");
    write(&repo, "app/service.yaml", "kind: Service\n");
    assert_ne!(resolve_revision(&url(&repo), "main").expect("resolve"), before);
}
