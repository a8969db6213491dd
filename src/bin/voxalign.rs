use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use voxalign::orchestrator::SequenceRegistrationOpts;
use voxalign::{
    OrchestratorOpts, RegistrationConfig, RegistrationInputs, RegistrationOrchestrator, Scene,
    SynthesisFlags, WorkspaceOptions, meta_image, synthesize,
    transform::{TransformRepr, format_mat4},
};

#[derive(Parser, Debug)]
#[command(name = "voxalign", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a moving volume onto a fixed volume.
    Register(RegisterArgs),
    /// Register every frame of a sequence onto a reference frame.
    RegisterSequence(RegisterSequenceArgs),
    /// Print the synthesized backend parameter document.
    Params(ParamsArgs),
}

#[derive(Parser, Debug)]
struct RegisterArgs {
    /// Fixed (reference) volume, uncompressed .mha.
    #[arg(long)]
    fixed: PathBuf,

    /// Moving volume, uncompressed .mha.
    #[arg(long)]
    moving: PathBuf,

    /// Optional fixed-space mask volume.
    #[arg(long)]
    fixed_mask: Option<PathBuf>,

    /// Optional moving-space mask volume.
    #[arg(long)]
    moving_mask: Option<PathBuf>,

    /// Output path for the resulting 4x4 matrix (text, row per line).
    #[arg(long)]
    out: PathBuf,

    /// Write the matrix as JSON (column-major 16-element array) instead of text.
    #[arg(long)]
    json: bool,

    /// Registration backend.
    #[arg(long, value_enum, default_value_t = StrategyChoice::LinearFit)]
    strategy: StrategyChoice,

    /// External optimizer executable (for --strategy optimizer).
    #[arg(long, default_value = "elastix")]
    optimizer_exe: PathBuf,

    /// Keep the scratch workspace on disk for inspection.
    #[arg(long)]
    retain_workspace: bool,

    #[command(flatten)]
    flags: FlagArgs,
}

#[derive(Parser, Debug)]
struct RegisterSequenceArgs {
    /// Sequence frames in temporal order, uncompressed .mha files.
    #[arg(long, required = true, num_args = 1..)]
    frames: Vec<PathBuf>,

    /// Reference frame index.
    #[arg(long, default_value_t = 0)]
    fixed_index: usize,

    /// Directory for the aligned output frames.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ParamsArgs {
    #[command(flatten)]
    flags: FlagArgs,
}

#[derive(Parser, Debug)]
struct FlagArgs {
    /// Treat inputs as already roughly aligned.
    #[arg(long)]
    prealigned: bool,

    /// Erode masks per resolution level (for hard-edged masks).
    #[arg(long)]
    mask_hard_edge: bool,

    /// Manual parameter scaling (roughly 1000-9000); estimated when unset.
    #[arg(long)]
    scales: Option<f64>,
}

impl FlagArgs {
    fn to_synthesis(&self) -> SynthesisFlags {
        SynthesisFlags {
            prealigned: self.prealigned,
            mask_has_hard_edge: self.mask_hard_edge,
            scales: self.scales,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyChoice {
    LinearFit,
    Optimizer,
}

impl StrategyChoice {
    fn name(self) -> &'static str {
        match self {
            Self::LinearFit => "linear-fit",
            Self::Optimizer => "optimizer",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Register(args) => cmd_register(args),
        Command::RegisterSequence(args) => cmd_register_sequence(args),
        Command::Params(args) => cmd_params(args),
    }
}

fn load_volume(scene: &mut Scene, name: &str, path: &PathBuf) -> anyhow::Result<voxalign::NodeId> {
    let volume = meta_image::read(path)
        .with_context(|| format!("load volume '{}'", path.display()))?;
    Ok(scene.add_volume(name, volume))
}

fn cmd_register(args: RegisterArgs) -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let fixed = load_volume(&mut scene, "fixed", &args.fixed)?;
    let moving = load_volume(&mut scene, "moving", &args.moving)?;
    let fixed_mask = match &args.fixed_mask {
        Some(p) => Some(load_volume(&mut scene, "fixedMask", p)?),
        None => None,
    };
    let moving_mask = match &args.moving_mask {
        Some(p) => Some(load_volume(&mut scene, "movingMask", p)?),
        None => None,
    };

    let optimizer = voxalign::OptimizerOpts {
        executable: args.optimizer_exe.clone(),
    };
    if matches!(args.strategy, StrategyChoice::Optimizer)
        && !voxalign::backend::optimizer::is_optimizer_on_path(&optimizer)
    {
        anyhow::bail!(
            "optimizer executable '{}' not found on PATH",
            args.optimizer_exe.display()
        );
    }

    let opts = OrchestratorOpts {
        workspace: WorkspaceOptions {
            root: None,
            retain: args.retain_workspace,
        },
        optimizer,
        synthesis: args.flags.to_synthesis(),
        ..Default::default()
    };

    let mut orchestrator = RegistrationOrchestrator::new(opts);
    let output = orchestrator.register_volumes(
        &mut scene,
        RegistrationInputs {
            fixed: Some(fixed),
            moving: Some(moving),
            fixed_mask,
            moving_mask,
            output_transform: None,
        },
        args.strategy.name(),
    )?;

    let node = scene.transform(output.transform)?;
    match node.repr.as_ref().and_then(TransformRepr::as_linear) {
        Some(matrix) => {
            let rendered = if args.json {
                serde_json::to_string_pretty(&matrix).context("serialize transform matrix")?
            } else {
                format_mat4(&matrix)
            };
            std::fs::write(&args.out, rendered)
                .with_context(|| format!("write transform '{}'", args.out.display()))?;
            eprintln!("wrote {}", args.out.display());
        }
        None => {
            eprintln!(
                "result is a general transform ('{}'); no matrix written",
                node.name
            );
        }
    }
    Ok(())
}

fn cmd_register_sequence(args: RegisterSequenceArgs) -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let mut frames = Vec::with_capacity(args.frames.len());
    for (index, path) in args.frames.iter().enumerate() {
        frames.push(load_volume(&mut scene, &format!("frame{index}"), path)?);
    }
    let sequence = scene.add_sequence("sequence", frames);

    let mut orchestrator = RegistrationOrchestrator::default();
    let output = orchestrator.register_sequence(
        &mut scene,
        sequence,
        SequenceRegistrationOpts {
            fixed_index: args.fixed_index,
            frame_range: None,
            emit_transforms: false,
        },
    )?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;
    let aligned = scene.sequence(output.output_sequence)?.frames.clone();
    for (index, id) in aligned.iter().enumerate() {
        let path = args.out_dir.join(format!("frame{index:03}.mha"));
        scene.save_volume(*id, &path)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_params(args: ParamsArgs) -> anyhow::Result<()> {
    let document = synthesize(&RegistrationConfig::new(), args.flags.to_synthesis());
    print!("{}", document.to_document());
    Ok(())
}
