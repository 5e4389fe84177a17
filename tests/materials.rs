//! Material assignment import and binding through a full stream.

mod common;

use alembic_stream::config::StreamSettings;
use alembic_stream::host::{MemoryHost, SceneHost};
use alembic_stream::material::AssignmentDocument;
use alembic_stream::reader::memory::{MeshDesc, NodeDesc, SceneDesc};
use alembic_stream::Stream;

use common::{bound_stream, bound_stream_with, capture_logs, quad_row, static_mesh, SCENE};

const SPLIT_BODY: &str = r#"
<assignments>
  <node path="/body">
    <shader name="red">2-4</shader>
    <shader name="blue"></shader>
  </node>
</assignments>
"#;

fn material_names(host: &MemoryHost, stream: &Stream, path: &str) -> Vec<String> {
    let obj = host.find_path(stream.root(), path).unwrap();
    host.materials(obj)
        .unwrap()
        .iter()
        .map(|&m| host.material_name(m).unwrap().to_string())
        .collect()
}

#[test]
fn test_faceset_round_trip() {
    let desc = SceneDesc::new(vec![static_mesh("body", 5)]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);
    assert_eq!(host.stats().index_uploads, 1);

    let document = AssignmentDocument::parse(SPLIT_BODY).unwrap();
    assert_eq!(stream.import_material_assignments(&mut host, &document), 2);

    let cache = stream.facesets("/body").unwrap();
    assert_eq!(cache.facesets().iter().next(), Some(&[2u32, 3, 4][..]));
    assert!(cache.is_dirty());

    stream.update(&mut host, 0.0);
    assert_eq!(material_names(&host, &stream, "body"), vec!["red", "blue"]);
    let body = host.find_path(stream.root(), "body").unwrap();
    let mesh = host.mesh(host.mesh_of(body).unwrap()).unwrap();
    // Faces 2-4 first, then the whole-object remainder (faces 0 and 1).
    assert_eq!(mesh.submeshes[0].len(), 18);
    assert_eq!(mesh.submeshes[1].len(), 12);
    assert!(!stream.facesets("/body").unwrap().is_dirty());
    let uploads = host.stats().index_uploads;

    // Same content again: nothing dirty, nothing re-uploaded.
    stream.import_material_assignments(&mut host, &document);
    assert!(!stream.facesets("/body").unwrap().is_dirty());
    stream.update(&mut host, 0.0);
    assert_eq!(host.stats().index_uploads, uploads);
    assert_eq!(material_names(&host, &stream, "body"), vec!["red", "blue"]);
}

#[test]
fn test_surface_wins_and_instance_selects_mesh() {
    let desc = SceneDesc::new(vec![
        static_mesh("body", 1),
        NodeDesc::mesh("copy", MeshDesc::new(vec![])).instance_of("/body"),
    ]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);

    let document = AssignmentDocument::parse(
        r#"<assignments>
             <node path="/body">
               <shader name="ignored" surface="steel"/>
               <shader name="gold" instance="1"/>
               <shader name="nobody" instance="5"/>
             </node>
           </assignments>"#,
    )
    .unwrap();
    assert_eq!(stream.import_material_assignments(&mut host, &document), 2);
    assert!(stream.facesets("/body").is_some());
    assert!(stream.facesets("/copy").is_some());

    stream.update(&mut host, 0.0);
    assert_eq!(material_names(&host, &stream, "body"), vec!["steel"]);
}

#[test]
fn test_not_enough_submeshes_warns_and_keeps_pending() {
    let desc = SceneDesc::new(vec![static_mesh("body", 2)]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);

    // Both sets cover the same face: the second never gets a submesh.
    let document = AssignmentDocument::parse(
        r#"<assignments><node path="/body">
             <shader name="a">0</shader>
             <shader name="b">0</shader>
             <shader name="c">0</shader>
           </node></assignments>"#,
    )
    .unwrap();
    let (_, logs) = capture_logs(|| {
        stream.import_material_assignments(&mut host, &document);
        stream.update(&mut host, 0.0);
    });

    assert_eq!(logs.count("Not enough submeshes"), 1);
    assert_eq!(stream.facesets("/body").unwrap().pending_materials().len(), 3);
    assert_eq!(stream.stats().material_binds, 0);
}

#[test]
fn test_missing_renderer_changes_nothing() {
    let desc = SceneDesc::new(vec![static_mesh("body", 2)]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);
    let body = host.find_path(stream.root(), "body").unwrap();
    host.remove_renderer(body);

    let document = AssignmentDocument::parse(r#"<assignments><node path="/body"><shader name="a"/></node></assignments>"#).unwrap();
    let (_, logs) = capture_logs(|| {
        stream.import_material_assignments(&mut host, &document);
        stream.update(&mut host, 0.0);
    });
    assert_eq!(logs.count("No renderer"), 1);
    assert!(host.materials(body).is_none());
}

#[test]
fn test_split_child_material_propagates_to_parent() {
    let mut desc = SceneDesc::new(vec![NodeDesc::mesh(
        "body",
        MeshDesc::new(vec![quad_row(0.0, 1, 0.0), quad_row(1.0, 2, 0.0)]),
    )]);
    desc.max_split_vertices = 64;
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);

    // The parent only carries a renderer when the host gave it one.
    let body = host.find_path(stream.root(), "body").unwrap();
    host.attach_mesh(body);

    let document = AssignmentDocument::parse(r#"<assignments><node path="/body"><shader name="skin"/></node></assignments>"#).unwrap();
    stream.import_material_assignments(&mut host, &document);
    stream.update(&mut host, 0.0);

    assert_eq!(material_names(&host, &stream, "body/body_split_0"), vec!["skin"]);
    assert_eq!(material_names(&host, &stream, "body"), vec!["skin"]);
}

#[test]
fn test_import_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("assign.xml");
    std::fs::write(&manifest, SPLIT_BODY).unwrap();

    let desc = SceneDesc::new(vec![static_mesh("body", 5)]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.0);
    assert_eq!(stream.import_material_file(&mut host, &manifest).unwrap(), 2);
    stream.update(&mut host, 0.0);
    assert_eq!(stream.stats().material_binds, 1);

    assert!(stream.import_material_file(&mut host, dir.path().join("missing.xml")).is_err());
}

#[test]
fn test_file_log_follows_settings() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stream.log");

    let desc = SceneDesc::new(vec![static_mesh("body", 1)]);
    let mut settings = StreamSettings::with_source(SCENE);
    settings.diagnostics.verbose = true;
    settings.diagnostics.log_to_file = true;
    settings.diagnostics.log_path = Some(log.clone());
    let (mut stream, mut host, _) = bound_stream_with(&desc, settings);

    let (_, console) = capture_logs(|| stream.update(&mut host, 0.0));
    assert!(stream.file_log().is_open());
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("stream update"));
    // The surrounding subscriber still sees the tick.
    assert!(console.count("stream update") >= 1);

    // Reopening after a settings change appends.
    stream.settings_mut().diagnostics.verbose = false;
    stream.update(&mut host, 0.5);
    assert!(std::fs::read_to_string(&log).unwrap().starts_with(&text));

    stream.settings_mut().diagnostics.log_to_file = false;
    stream.update(&mut host, 0.0);
    assert!(!stream.file_log().is_open());
}
