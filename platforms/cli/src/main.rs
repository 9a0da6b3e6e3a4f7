use clap::{ArgAction, Parser};
use std::path::Path;
use std::process::ExitCode;
use tmkit::types::{MAX_BRANCHES, MAX_EXECUTION_STEPS, MAX_TREE_DEPTH};
use tmkit::{
    Configuration, Execution, Limits, MachineError, MachineKind, MachineRecord, ProgramLoader,
    ProgramManager,
};
use tracing::{debug, Level};

#[derive(Parser)]
#[clap(author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// A machine file (`.tm` or `.json`) or the name of a built-in machine
    #[clap(short, long, required_unless_present = "list")]
    program: Option<String>,

    /// The input of one tape, repeat for multi-tape machines
    #[clap(short, long)]
    input: Vec<String>,

    /// Maximum number of steps along one path
    #[clap(long, default_value_t = MAX_EXECUTION_STEPS)]
    max_steps: usize,

    /// Maximum number of branches a non-deterministic search explores
    #[clap(long, default_value_t = MAX_BRANCHES)]
    max_branches: usize,

    /// Maximum depth of computation-tree analysis
    #[clap(long, default_value_t = MAX_TREE_DEPTH)]
    max_depth: usize,

    /// Print each configuration of the trace
    #[clap(short = 'd', long)]
    trace: bool,

    /// Analyze the computation tree of a non-deterministic machine
    #[clap(long)]
    analyze: bool,

    /// Print the single-tape equivalent of a multi-tape machine
    #[clap(long)]
    convert: bool,

    /// Print results as JSON
    #[clap(long)]
    json: bool,

    /// List the built-in machines
    #[clap(short, long)]
    list: bool,

    /// Log verbosity, repeat for more detail
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_branches: self.max_branches,
            max_depth: self.max_depth,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), MachineError> {
    if cli.list {
        return list();
    }

    let program = cli.program.as_deref().unwrap_or_default();
    let record = load(program)?;
    let machine = MachineKind::from_record(&record)?;
    debug!(kind = machine.type_name(), tapes = machine.tape_count(), "machine loaded");

    if cli.convert {
        return convert(&machine);
    }

    let mut inputs = cli.input.clone();
    if inputs.len() < machine.tape_count() {
        inputs.resize(machine.tape_count(), String::new());
    }
    let inputs: Vec<&str> = inputs.iter().map(String::as_str).collect();

    if cli.analyze {
        return analyze(cli, &machine, &inputs);
    }

    let execution = machine.simulate(&inputs, &cli.limits())?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_execution(&execution, cli.trace);
    }

    Ok(())
}

/// Loads a machine file, falling back to the built-in catalog when no such file exists.
fn load(program: &str) -> Result<MachineRecord, MachineError> {
    let path = Path::new(program);
    if path.exists() {
        ProgramLoader::load_program(path)
    } else {
        ProgramManager::get_program_by_name(program)
    }
}

fn list() -> Result<(), MachineError> {
    for index in 0..ProgramManager::get_program_count() {
        let info = ProgramManager::get_program_info(index)?;
        println!(
            "{}: {} ({}, {} tape(s), {} states, {} transitions)",
            info.index,
            info.name,
            info.kind,
            info.tape_count,
            info.state_count,
            info.transition_count
        );
    }
    Ok(())
}

fn convert(machine: &MachineKind) -> Result<(), MachineError> {
    let MachineKind::MultiTape(multi) = machine else {
        return Err(MachineError::InvalidInput(format!(
            "--convert needs a multi-tape machine, got {}",
            machine.type_name()
        )));
    };

    let single = multi.convert_to_single_tape()?;
    println!("{}", single.to_record().to_json()?);
    Ok(())
}

fn analyze(cli: &Cli, machine: &MachineKind, inputs: &[&str]) -> Result<(), MachineError> {
    let (MachineKind::NonDeterministic(ntm), [input]) = (machine, inputs) else {
        return Err(MachineError::InvalidInput(format!(
            "--analyze needs a non-deterministic machine and one input, got {} with {} input(s)",
            machine.type_name(),
            inputs.len()
        )));
    };

    let analysis = ntm.analyze_computation_tree(input, cli.max_depth)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("Outcome: {:?}", analysis.outcome);
        println!("Nodes: {}", analysis.nodes);
        println!("Accepting leaves: {}", analysis.accepting_leaves);
        println!("Rejecting leaves: {}", analysis.rejecting_leaves);
        println!("Depth-limited paths: {}", analysis.depth_limited);
        println!("Cycles: {}", analysis.cycles);
        println!("Deepest path: {}", analysis.deepest);
    }
    Ok(())
}

fn print_configuration(configuration: &Configuration) {
    let tapes = configuration
        .tapes()
        .iter()
        .map(|tape| tape.contents())
        .collect::<Vec<String>>()
        .join(", ");

    println!(
        "Step: {}, State: {}, Tapes: [{}], Heads: {:?}",
        configuration.step_count(),
        configuration.state(),
        tapes,
        configuration.heads()
    );
}

fn print_execution(execution: &Execution, trace: bool) {
    if trace {
        execution.trace.iter().for_each(print_configuration);
        println!();
    }

    println!(
        "Result: {}",
        if execution.accepted { "accepted" } else { "rejected" }
    );
    println!("Steps: {}", execution.step_count());

    if let Some(last) = execution.final_configuration() {
        println!("Final state: {}", last.state());
        println!("Final tapes:");
        for tape in last.tapes() {
            println!("{}", tape.contents());
        }
    }

    if let Some(summary) = &execution.summary {
        println!("Branches explored: {}", summary.branches_explored);
        println!("Accepting branches: {}", summary.accepting_branches);
        if summary.branch_limit_reached {
            println!("Branch limit reached");
        }
        if let Some(branch) = &summary.first_accepting_branch {
            println!("First accepting branch: {}", branch);
        }
    }
}
