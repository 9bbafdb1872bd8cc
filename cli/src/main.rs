use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fxvm_core::asm::{assemble, disassemble};
use fxvm_core::bundle::{LayoutEntry, decode_chunks};
use fxvm_core::{Bundle, BundleImage, DispatchStats, Extent3, VmOptions, decode_bundle, encode_bundle};
use serde::Serialize;

mod job;

use job::{BoundUav, Job, render_words};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "fxvm::bundle=debug,fxvm::dispatch=debug,fxvm::resource=debug,fxvm::vm=debug,fxvm::cli=debug";

/// Extension of assembler sources; anything else is read as a binary bundle.
const SOURCE_EXT: &str = "fxasm";
const BUNDLE_EXT: &str = "fxb";

#[derive(Debug, Parser)]
#[command(name = "fxvm", author, version, about = "Assemble, inspect and run FXVM kernel bundles", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Assemble a `.fxasm` source into a binary bundle.
    Asm {
        #[arg(value_name = "SRC", value_parser = parse_sanitized_path)]
        src: PathBuf,
        /// Output path (defaults to SRC with a `.fxb` extension)
        #[arg(short, long, value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
    },
    /// Print a bundle as assembler source.
    Disasm {
        #[arg(value_name = "BUNDLE", value_parser = parse_sanitized_path)]
        bundle: PathBuf,
    },
    /// Show chunks, layout and constant-buffer contents.
    Inspect {
        #[arg(value_name = "BUNDLE", value_parser = parse_sanitized_path)]
        bundle: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Dispatch a kernel over a thread grid and print UAV contents as JSON.
    Run {
        #[arg(value_name = "BUNDLE", value_parser = parse_sanitized_path)]
        bundle: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
        /// Thread groups as `x[,y[,z]]` (overrides the job file)
        #[arg(long, value_parser = parse_extent)]
        groups: Option<Extent3>,
        /// Threads per group as `x[,y[,z]]` (overrides the job file)
        #[arg(long, value_parser = parse_extent)]
        threads: Option<Extent3>,
    },
    /// Run a single thread and print its return value.
    Play {
        #[arg(value_name = "BUNDLE", value_parser = parse_sanitized_path)]
        bundle: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
    },
}

#[derive(Debug, clap::Args)]
struct ExecArgs {
    /// Job file (TOML, YAML or JSON) with constants, buffers and UAVs
    #[arg(long, value_parser = parse_sanitized_path)]
    job: Option<PathBuf>,
    /// Check register, slot and pc accesses; also enabled by FXVM_VALIDATE
    #[arg(long)]
    validate: bool,
    /// Abort a thread after N instructions (implies --validate)
    #[arg(long, value_name = "N")]
    step_limit: Option<u64>,
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn parse_extent(raw: &str) -> Result<Extent3, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(format!("expected 1 to 3 comma separated values, got '{}'", raw));
    }
    let mut dims = [1u32; 3];
    for (dim, part) in dims.iter_mut().zip(&parts) {
        *dim = part.parse().map_err(|_| format!("invalid extent component '{}'", part))?;
    }
    Ok(Extent3::from(dims))
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("FXVM_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn is_source(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXT))
}

fn read_image(path: &Path) -> anyhow::Result<BundleImage> {
    if is_source(path) {
        let src =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read source '{}'", path.display()))?;
        return assemble(&src).with_context(|| format!("Failed to assemble '{}'", path.display()));
    }
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read bundle '{}'", path.display()))?;
    decode_bundle(&bytes).with_context(|| format!("Failed to decode bundle '{}'", path.display()))
}

fn bundle_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string())
}

/// Validation is on if the flag, `FXVM_VALIDATE` or the job asks for it; a step limit implies it.
fn resolve_options(exec: &ExecArgs, job: &Job, env_validate: Option<&str>) -> VmOptions {
    let step_limit = exec.step_limit.or(job.step_limit);
    let validate = exec.validate
        || env_validate.is_some_and(env_toggle_enabled)
        || job.validate.unwrap_or(false)
        || step_limit.is_some();
    let mut options = if validate {
        VmOptions::validated()
    } else {
        VmOptions::default()
    };
    options.step_limit = step_limit;
    options
}

struct Prepared {
    bundle: Bundle,
    job: Job,
    uavs: Vec<BoundUav>,
}

fn prepare(path: &Path, exec: &ExecArgs) -> anyhow::Result<Prepared> {
    let job = match &exec.job {
        Some(job_path) => Job::load(job_path)?,
        None => Job::default(),
    };
    let env_validate = std::env::var("FXVM_VALIDATE").ok();
    let options = resolve_options(exec, &job, env_validate.as_deref());
    let mut bundle = Bundle::from_image(&bundle_name(path), read_image(path)?).with_options(options);
    let uavs = job.apply(&mut bundle)?;
    Ok(Prepared { bundle, job, uavs })
}

#[derive(Serialize)]
struct UavDump {
    counter: u32,
    data: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct RunReport {
    bundle: String,
    groups: Extent3,
    threads: Extent3,
    stats: DispatchStats,
    uavs: BTreeMap<String, UavDump>,
}

#[derive(Serialize)]
struct ChunkInfo {
    ty: u32,
    name: String,
    bytes: usize,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    chunks: Vec<ChunkInfo>,
    instructions: usize,
    layout: &'a [LayoutEntry],
    constants: Vec<u32>,
}

fn dump_uavs(bundle: &Bundle, uavs: &[BoundUav]) -> anyhow::Result<BTreeMap<String, UavDump>> {
    let mut out = BTreeMap::new();
    for bound in uavs {
        let counter = bundle.read_view(bound.uav.counter())?.u32_at(0).unwrap_or(0);
        let data = render_words(bound.format, bundle.read_view(bound.uav.data)?.words());
        out.insert(bound.uav.name.clone(), UavDump { counter, data });
    }
    Ok(out)
}

fn run_inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let bytes = if is_source(path) {
        encode_bundle(&read_image(path)?)?
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read bundle '{}'", path.display()))?
    };
    let chunks = decode_chunks(&bytes)?
        .iter()
        .map(|chunk| ChunkInfo {
            ty: chunk.ty.0,
            name: chunk.ty.to_string(),
            bytes: chunk.payload.len(),
        })
        .collect::<Vec<_>>();
    let image = decode_bundle(&bytes)?;
    let constants = image
        .constants
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect::<Vec<_>>();
    let report = InspectReport {
        chunks,
        instructions: image.code.len(),
        layout: &image.layout,
        constants,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("chunks:");
    for chunk in &report.chunks {
        println!("  {:<10} {:>8} bytes", chunk.name, chunk.bytes);
    }
    println!("instructions: {}", report.instructions);
    println!("layout:");
    for entry in report.layout {
        print!("  {} {} offset={} size={}", entry.name, entry.ty, entry.offset, entry.size);
        if !entry.semantic.is_empty() {
            print!(" semantic={}", entry.semantic);
        }
        println!();
    }
    println!("constants ({} bytes):", report.constants.len() * 4);
    for (row, words) in report.constants.chunks(4).enumerate() {
        let cells: Vec<String> = words.iter().map(|w| format!("0x{:08x}", w)).collect();
        println!("  {:04x}: {}", row * 16, cells.join(" "));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { command } = CliArgs::parse();

    match command {
        Commands::Asm { src, output } => {
            let text =
                std::fs::read_to_string(&src).with_context(|| format!("Failed to read source '{}'", src.display()))?;
            let image = assemble(&text).with_context(|| format!("Failed to assemble '{}'", src.display()))?;
            let bytes = encode_bundle(&image)?;
            let out_path = output.unwrap_or_else(|| src.with_extension(BUNDLE_EXT));
            std::fs::write(&out_path, &bytes).with_context(|| format!("Failed to write '{}'", out_path.display()))?;
            println!(
                "wrote {} ({} instructions, {} bytes)",
                out_path.display(),
                image.code.len(),
                bytes.len()
            );
        }
        Commands::Disasm { bundle } => {
            let image = read_image(&bundle)?;
            print!("{}", disassemble(&image)?);
        }
        Commands::Inspect { bundle, json } => {
            run_inspect(&bundle, json)?;
        }
        Commands::Run {
            bundle,
            exec,
            groups,
            threads,
        } => {
            let Prepared { mut bundle, job, uavs } = prepare(&bundle, &exec)?;
            let groups = groups.or(job.groups.map(Extent3::from)).unwrap_or(Extent3::ONE);
            let threads = threads.or(job.threads.map(Extent3::from)).unwrap_or(Extent3::ONE);
            let stats = bundle.dispatch(groups, threads)?;
            let report = RunReport {
                bundle: bundle.name().to_string(),
                groups,
                threads,
                stats,
                uavs: dump_uavs(&bundle, &uavs)?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Play { bundle, exec } => {
            let Prepared { mut bundle, .. } = prepare(&bundle, &exec)?;
            let ret = bundle.play()?;
            println!("{}", ret);
        }
    }

    Ok(())
}
