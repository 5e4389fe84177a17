//! alembic-stream CLI - Inspect scene files and drive a stream headless.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use alembic_stream::clock::CycleMode;
use alembic_stream::config::StreamSettings;
use alembic_stream::host::{MemoryHost, ObjectId, SceneHost};
use alembic_stream::logging;
use alembic_stream::material::AssignmentDocument;
use alembic_stream::reader::{AssetResolver, MemoryReader, NodeId, NodeKind, SceneReader};
use alembic_stream::Stream;

#[derive(Parser)]
#[command(name = "alembic-stream", version, about = "Stream scene caches into an in-memory host")]
struct Cli {
    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show time range, node counts and hierarchy of a scene file
    #[command(alias = "i")]
    Info {
        scene: PathBuf,
    },
    /// Play a scene through a stream and report what reached the host
    #[command(alias = "p")]
    Play {
        scene: PathBuf,
        /// Stream settings (JSON); defaults otherwise
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Ticks per second of host time
        #[arg(long, default_value_t = 24.0)]
        fps: f64,
        /// Number of ticks; defaults to the length of the playback range
        #[arg(short = 'n', long)]
        frames: Option<usize>,
        /// Cycle mode override
        #[arg(long, value_parser = parse_cycle)]
        cycle: Option<CycleMode>,
        /// Decode on a background worker
        #[arg(long)]
        threads: bool,
        /// Material assignment manifest imported before playback
        #[arg(long)]
        assign: Option<PathBuf>,
        /// Mirror stream diagnostics into this file
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Write the reconciled settings here after playback
        #[arg(long)]
        save_settings: Option<PathBuf>,
    },
    /// Import a material assignment manifest and show the bound materials
    #[command(alias = "a")]
    Assign {
        scene: PathBuf,
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Info { scene } => cmd_info(&scene),
        Command::Play {
            scene,
            settings,
            fps,
            frames,
            cycle,
            threads,
            assign,
            log_file,
            save_settings,
        } => {
            let mut settings = match settings {
                Some(path) => StreamSettings::load(&path)
                    .with_context(|| format!("cannot load settings {}", path.display()))?,
                None => StreamSettings::default(),
            };
            if let Some(cycle) = cycle {
                settings.playback.cycle = cycle;
            }
            settings.advanced.use_threads |= threads;
            settings.diagnostics.verbose |= cli.verbose;
            if let Some(path) = log_file {
                settings.diagnostics.log_to_file = true;
                settings.diagnostics.log_path = Some(path);
            }
            let options = PlayOptions {
                fps,
                frames,
                assign,
                save_settings,
            };
            cmd_play(&scene, settings, &options)
        }
        Command::Assign { scene, manifest } => cmd_assign(&scene, &manifest),
    }
}

fn parse_cycle(text: &str) -> std::result::Result<CycleMode, String> {
    match text.to_ascii_lowercase().as_str() {
        "hold" => Ok(CycleMode::Hold),
        "loop" => Ok(CycleMode::Loop),
        "reverse" => Ok(CycleMode::Reverse),
        "bounce" => Ok(CycleMode::Bounce),
        "clip" => Ok(CycleMode::Clip),
        other => Err(format!("unknown cycle mode '{other}' (hold, loop, reverse, bounce, clip)")),
    }
}

// ============================================================================
// info
// ============================================================================

#[derive(Default)]
struct NodeCounts {
    groups: usize,
    xforms: usize,
    meshes: usize,
    cameras: usize,
    points: usize,
    instances: usize,
    constant: usize,
}

impl NodeCounts {
    fn total(&self) -> usize {
        self.groups + self.xforms + self.meshes + self.cameras + self.points
    }
}

fn cmd_info(path: &Path) -> Result<()> {
    info!("Opening scene: {}", path.display());
    let reader = MemoryReader::load(path).with_context(|| format!("cannot open {}", path.display()))?;

    let mut counts = NodeCounts::default();
    count_nodes(&reader, reader.root(), &mut counts);
    debug!("Counted {} nodes", counts.total());

    let (start, end) = reader.time_range();
    println!("Scene: {}", path.display());
    println!("Time range: {start:.3} - {end:.3}");
    println!();
    println!("Nodes:");
    println!("  Groups:  {}", counts.groups);
    println!("  Xforms:  {}", counts.xforms);
    println!("  Meshes:  {}", counts.meshes);
    println!("  Cameras: {}", counts.cameras);
    println!("  Points:  {}", counts.points);
    if counts.instances > 0 {
        println!("  Instances: {}", counts.instances);
    }
    println!("  Constant:  {}", counts.constant);
    println!();
    println!("Total nodes: {}", counts.total());
    println!();
    print_tree(&reader, reader.root(), 0);
    Ok(())
}

fn count_nodes(reader: &dyn SceneReader, node: NodeId, counts: &mut NodeCounts) {
    for &child in reader.children(node) {
        let Some(info) = reader.node(child) else {
            continue;
        };
        match info.kind {
            NodeKind::Group => counts.groups += 1,
            NodeKind::Xform => counts.xforms += 1,
            NodeKind::Mesh => counts.meshes += 1,
            NodeKind::Camera => counts.cameras += 1,
            NodeKind::Points => counts.points += 1,
        }
        if info.instance_source.is_some() {
            counts.instances += 1;
        }
        if info.constant {
            counts.constant += 1;
        }
        count_nodes(reader, child, counts);
    }
}

fn print_tree(reader: &dyn SceneReader, node: NodeId, depth: usize) {
    for &child in reader.children(node) {
        let Some(info) = reader.node(child) else {
            continue;
        };
        let indent = "  ".repeat(depth);
        let mut line = format!("{indent}{} [{}]", info.name, info.kind);
        if let Some(source) = &info.instance_source {
            line.push_str(&format!(" -> {source}"));
        }
        if let Some((start, end)) = info.time_range {
            line.push_str(&format!(" {start:.3}..{end:.3}"));
        }
        println!("{line}");
        print_tree(reader, child, depth + 1);
    }
}

// ============================================================================
// play
// ============================================================================

struct PlayOptions {
    fps: f64,
    frames: Option<usize>,
    assign: Option<PathBuf>,
    save_settings: Option<PathBuf>,
}

/// Bind `scene` under a fresh host root; the resolver serves the scene's
/// directory.
fn open_stream(scene: &Path, mut settings: StreamSettings) -> Result<(Stream, MemoryHost)> {
    let dir = scene.parent().map(Path::to_path_buf).unwrap_or_default();
    let Some(file) = scene.file_name() else {
        bail!("not a scene file: {}", scene.display());
    };
    settings.source_path = Some(PathBuf::from(file));

    let mut host = MemoryHost::new();
    let root = host.create_object(None, "stream");
    let mut stream = Stream::new(settings, root, Arc::new(AssetResolver::new(dir)));
    stream
        .load(&mut host, true)
        .with_context(|| format!("cannot bind {}", scene.display()))?;
    Ok((stream, host))
}

fn cmd_play(scene: &Path, settings: StreamSettings, options: &PlayOptions) -> Result<()> {
    if options.fps <= 0.0 {
        bail!("fps must be positive");
    }
    let (mut stream, mut host) = open_stream(scene, settings)?;

    if let Some(manifest) = &options.assign {
        let applied = stream
            .import_material_file(&mut host, manifest)
            .with_context(|| format!("cannot import {}", manifest.display()))?;
        info!("Imported {applied} material assignment(s)");
    }

    let playback = &stream.settings().playback;
    let length = (playback.end_time - playback.start_time).max(0.0);
    let frames = options
        .frames
        .unwrap_or_else(|| (length * options.fps).round() as usize + 1);
    let dt = 1.0 / options.fps;

    stream.update(&mut host, 0.0);
    for _ in 1..frames {
        stream.advance_by(&mut host, dt);
    }
    stream.flush(&mut host);

    let stats = stream.stats();
    let host_stats = host.stats();
    println!("Scene: {}", scene.display());
    println!("Ticks: {} ({} resampled)", stats.ticks, stats.resamples);
    println!("Last sample time: {:.3}", stream.sample_time());
    println!();
    println!("Decode:");
    println!("  Requests:  {}", stats.requests);
    println!("  Applied:   {}", stats.samples_applied);
    println!("  Dropped:   {}", stats.samples_dropped);
    println!("  Errors:    {}", stats.decode_errors);
    println!();
    println!("Host:");
    println!("  Objects created: {}", host_stats.objects_created);
    println!("  Meshes created:  {}", host_stats.meshes_created);
    println!("  Vertex uploads:  {}", host_stats.vertex_uploads);
    println!("  Index uploads:   {}", host_stats.index_uploads);
    println!("  Mesh clears:     {}", host_stats.mesh_clears);
    if stats.instance_fallbacks > 0 {
        println!("  Instance fallbacks: {}", stats.instance_fallbacks);
    }
    if stats.material_binds > 0 {
        println!("  Material binds:  {}", stats.material_binds);
    }

    if let Some(path) = &options.save_settings {
        stream
            .settings()
            .save(path)
            .with_context(|| format!("cannot save settings {}", path.display()))?;
        info!("Settings written to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// assign
// ============================================================================

fn cmd_assign(scene: &Path, manifest: &Path) -> Result<()> {
    let document = AssignmentDocument::load(manifest).with_context(|| format!("cannot parse {}", manifest.display()))?;
    let (mut stream, mut host) = open_stream(scene, StreamSettings::default())?;

    // Meshes need submeshes before anything can bind.
    stream.update(&mut host, 0.0);
    let applied = stream.import_material_assignments(&mut host, &document);
    stream.advance_by(&mut host, 0.0);
    stream.flush(&mut host);

    println!("Manifest: {}", manifest.display());
    println!("Assignments: {applied} of {}", document.assignment_count());
    println!();

    let mut bound: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for proxy in stream.proxies().filter(|p| p.kind() == NodeKind::Mesh) {
        let mut names = Vec::new();
        collect_materials(&host, proxy.object, &mut names);
        if stream.facesets(&proxy.path).is_some() {
            bound.insert(proxy.path.clone(), names);
        }
    }
    for (path, names) in bound {
        println!("{path}: {}", names.join(", "));
    }
    Ok(())
}

fn collect_materials(host: &MemoryHost, object: ObjectId, out: &mut Vec<String>) {
    if let Some(materials) = host.materials(object) {
        out.extend(
            materials
                .iter()
                .map(|&m| host.material_name(m).unwrap_or("?").to_string()),
        );
    }
    for child in host.children(object) {
        if host.is_active(child) {
            collect_materials(host, child, out);
        }
    }
}
