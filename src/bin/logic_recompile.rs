// logic-recompile - AGI Logic round trip tool
// Decompiles each Logic resource to a basic block graph, recompiles it and
// writes the reassembled bytecode

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use log::{error, info};

use agilogic::logic_compiler::{CompilerOptions, LogicCompiler, RoundTrip};

#[derive(Debug, Clone, Copy, PartialEq)]
enum DotOutput {
    Cfg,
    Dominators,
    PostDominators,
}

impl DotOutput {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "cfg" => Some(DotOutput::Cfg),
            "dom" => Some(DotOutput::Dominators),
            "postdom" => Some(DotOutput::PostDominators),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            DotOutput::Cfg => "cfg.dot",
            DotOutput::Dominators => "dom.dot",
            DotOutput::PostDominators => "postdom.dot",
        }
    }

    fn render(self, trip: &RoundTrip, name: &str) -> String {
        match self {
            DotOutput::Cfg => trip.graph.to_graphviz(name),
            DotOutput::Dominators => trip.graph.dominator_tree().to_graphviz(name),
            DotOutput::PostDominators => trip.graph.post_dominator_tree().to_graphviz(name),
        }
    }
}

struct Arguments {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    config: Option<PathBuf>,
    dot: Vec<DotOutput>,
    listing: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }
    let arguments = parse_arguments(&args)?;

    let options = match &arguments.config {
        Some(path) => CompilerOptions::from_file(path)?,
        None => CompilerOptions::default(),
    };
    let compiler = LogicCompiler::new(options);
    fs::create_dir_all(&arguments.output_dir)?;

    let mut failures = 0;
    for input in &arguments.inputs {
        if let Err(err) = process_file(&compiler, input, &arguments) {
            error!("{}: {}", input.display(), err);
            failures += 1;
        }
    }

    info!(
        "processed {} resources, {} failed",
        arguments.inputs.len(),
        failures
    );
    if failures > 0 {
        process::exit(1);
    }
    Ok(())
}

fn parse_arguments(args: &[String]) -> Result<Arguments, Box<dyn std::error::Error>> {
    let mut arguments = Arguments {
        inputs: Vec::new(),
        output_dir: PathBuf::from("."),
        config: None,
        dot: Vec::new(),
        listing: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                let dir = args.get(i + 1).ok_or("-o requires a directory")?;
                arguments.output_dir = PathBuf::from(dir);
                i += 2;
            }
            "--config" => {
                let file = args.get(i + 1).ok_or("--config requires a filename")?;
                arguments.config = Some(PathBuf::from(file));
                i += 2;
            }
            "--dot" => {
                let kind = args
                    .get(i + 1)
                    .ok_or("--dot requires one of cfg, dom or postdom")?;
                let dot = DotOutput::parse(kind)
                    .ok_or_else(|| format!("Unknown graph '{}' for --dot", kind))?;
                arguments.dot.push(dot);
                i += 2;
            }
            "-l" | "--listing" => {
                arguments.listing = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option '{}'", arg);
                print_usage(&args[0]);
                process::exit(1);
            }
            file => {
                arguments.inputs.push(PathBuf::from(file));
                i += 1;
            }
        }
    }

    if arguments.inputs.is_empty() {
        return Err("No input files specified".into());
    }
    Ok(arguments)
}

fn process_file(
    compiler: &LogicCompiler,
    input: &Path,
    arguments: &Arguments,
) -> Result<(), Box<dyn std::error::Error>> {
    let code = fs::read(input)?;
    let trip = compiler.roundtrip(&code)?;

    let name = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "logic".to_string());

    let output = arguments.output_dir.join(format!("{}.out", name));
    fs::write(&output, &trip.code)?;
    info!(
        "{}: {} -> {} bytes in {}",
        input.display(),
        code.len(),
        trip.code.len(),
        output.display()
    );

    for dot in &arguments.dot {
        let path = arguments
            .output_dir
            .join(format!("{}.{}", name, dot.extension()));
        fs::write(&path, dot.render(&trip, &name))?;
    }

    if arguments.listing {
        println!("{}:", input.display());
        print!("{}", trip.result.listing());
    }
    Ok(())
}

fn print_usage(program_name: &str) {
    println!("Usage: {} [options] <logic files...>", program_name);
    println!();
    println!("Options:");
    println!("  -o, --output <dir>           Output directory (default: .)");
    println!("  --config <file>              TOML compiler options");
    println!("  --dot <cfg|dom|postdom>      Also write a Graphviz graph (repeatable)");
    println!("  -l, --listing                Print the recompiled listing");
    println!("  -h, --help                   Show this help message");
    println!();
    println!("Set RUST_LOG=debug for pass-by-pass detail.");
}
