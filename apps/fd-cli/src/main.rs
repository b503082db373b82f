use clap::{Parser, Subcommand};
use fd_app::{
    AppError, AppResult, CheckRequest, RestartPolicy, RunProgressEvent, SessionOptions,
    SessionStage, SolverSession, check_against_reference, export_run, list_runs,
};
use fd_sim::{ExternalFunctionProvider, TabulatedFunctions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "fd-cli")]
#[command(about = "fedyn CLI - transient structural dynamics solver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate model file syntax and references
    Validate {
        /// Path to the model YAML file
        model_path: PathBuf,
    },
    /// Solve a model from start to stop time
    Run {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// ASCII table `[time, f_1, ..., f_n]` supplying external functions
        #[arg(long)]
        functions: Option<PathBuf>,
        /// Leave the model file untouched
        #[arg(long)]
        no_write_back: bool,
        /// Start from the state stored by the previous write-back
        #[arg(long)]
        restart_from_last: bool,
        /// Do not store the run in the results database
        #[arg(long)]
        no_database: bool,
        /// Write the response history as an ASCII table
        #[arg(short, long)]
        export: Option<PathBuf>,
    },
    /// Solve a model and compare its response with a reference table.
    /// Exits with the number of discrepancies plus the error code.
    Check {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// Reference table with one `[time, out_1, ..., out_n]` row per step
        reference_path: PathBuf,
        /// Absolute tolerance per value
        #[arg(long, default_value_t = 1e-8)]
        tolerance: f64,
        /// Reference rows to skip before the first step
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
        /// ASCII table supplying external functions
        #[arg(long)]
        functions: Option<PathBuf>,
    },
    /// List stored runs of a model
    Runs {
        /// Path to the model YAML file
        model_path: PathBuf,
    },
    /// Export a stored run as an ASCII table
    Export {
        /// Path to the model YAML file
        model_path: PathBuf,
        /// Run ID
        run_id: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Run {
            model_path,
            functions,
            no_write_back,
            restart_from_last,
            no_database,
            export,
        } => cmd_run(
            &model_path,
            functions.as_deref(),
            SessionOptions {
                restart_policy: if restart_from_last {
                    RestartPolicy::FromLastState
                } else {
                    RestartPolicy::FromInitial
                },
                write_back: !no_write_back,
                results_database: !no_database,
                ..SessionOptions::default()
            },
            export.as_deref(),
        ),
        Commands::Check {
            model_path,
            reference_path,
            tolerance,
            skip_rows,
            functions,
        } => cmd_check(
            &model_path,
            &reference_path,
            tolerance,
            skip_rows,
            functions.as_deref(),
        ),
        Commands::Runs { model_path } => cmd_runs(&model_path),
        Commands::Export {
            model_path,
            run_id,
            output,
        } => cmd_export(&model_path, &run_id, &output),
    };

    match result {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code(e.code().max(1))
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(u8::MAX))
}

fn load_functions(path: Option<&Path>) -> AppResult<Option<Box<dyn ExternalFunctionProvider>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let functions = TabulatedFunctions::from_file(path)
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    println!(
        "Loaded {} external function(s) from {}",
        functions.channel_count(),
        path.display()
    );
    Ok(Some(Box::new(functions)))
}

fn cmd_validate(model_path: &Path) -> AppResult<i32> {
    println!("Validating model: {}", model_path.display());
    let model = fd_model::load_model(model_path)?;
    let def = model.def();
    println!("✓ Model is valid");
    println!("  Name: {}", def.name);
    println!("  Degrees of freedom: {}", def.dofs.len());
    println!("  Functions: {}", def.functions.len());
    println!("  Sensors: {}", def.sensors.len());
    println!(
        "  Time: {} .. {} s, dt = {} s",
        def.settings.start_time, def.settings.stop_time, def.settings.time_step
    );
    Ok(0)
}

fn cmd_run(
    model_path: &Path,
    functions: Option<&Path>,
    options: SessionOptions,
    export: Option<&Path>,
) -> AppResult<i32> {
    println!("Running model: {}", model_path.display());

    let mut session = SolverSession::new(options);
    if let Some(provider) = load_functions(functions)? {
        session = session.with_provider(provider);
    }

    let mut last_emit = Instant::now();
    let mut last_fraction = -1.0f64;
    session.set_progress_callback(move |event| {
        let fraction = event
            .step
            .as_ref()
            .map(|s| s.fraction_complete)
            .unwrap_or(-1.0);
        let emit_now = (fraction >= 0.0 && (fraction - last_fraction).abs() >= 0.005)
            || last_emit.elapsed().as_millis() >= 100;
        if emit_now {
            render_cli_progress(&event);
            if fraction >= 0.0 {
                last_fraction = fraction;
            }
            last_emit = Instant::now();
        }
    });

    let code = session.run_all(model_path)?;
    clear_progress_line();

    if code == 0 {
        println!("✓ Simulation completed");
    } else {
        println!("✗ Simulation failed with error code {code}");
    }
    println!("  Steps: {}", session.history().len());
    println!("  Final time: {:.6} s", session.get_current_time());

    if let Some(path) = export {
        session.export_history(path)?;
        println!(
            "✓ Exported {} steps to {}",
            session.history().len(),
            path.display()
        );
    }
    Ok(code)
}

fn cmd_check(
    model_path: &Path,
    reference_path: &Path,
    tolerance: f64,
    skip_rows: usize,
    functions: Option<&Path>,
) -> AppResult<i32> {
    println!(
        "Checking {} against {}",
        model_path.display(),
        reference_path.display()
    );
    let provider = load_functions(functions)?;
    let report = check_against_reference(
        CheckRequest {
            model_path,
            reference_path,
            tolerance,
            skip_rows,
            options: SessionOptions::default(),
        },
        provider,
    )?;

    println!("  Steps compared: {}", report.comparison.checked_steps);
    println!("  Discrepancies:  {}", report.comparison.discrepancies);
    println!("  Error code:     {}", report.error_code);
    if report.passed() {
        println!("✓ Response matches reference");
    } else {
        println!("✗ Response differs from reference");
    }
    Ok(report.exit_code())
}

fn cmd_runs(model_path: &Path) -> AppResult<i32> {
    let runs = list_runs(model_path)?;

    if runs.is_empty() {
        println!("No stored runs for model: {}", model_path.display());
    } else {
        println!("Stored runs for '{}':", model_path.display());
        for manifest in runs {
            println!(
                "  {} ({}, {} steps, t = {:.4} s, code {})",
                manifest.run_id,
                manifest.timestamp,
                manifest.steps,
                manifest.final_time,
                manifest.error_code
            );
        }
    }
    Ok(0)
}

fn cmd_export(model_path: &Path, run_id: &str, output: &Path) -> AppResult<i32> {
    let rows = export_run(model_path, run_id, output)?;
    println!("✓ Exported {} steps to {}", rows, output.display());
    Ok(0)
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    match (&event.stage, &event.step) {
        (SessionStage::Stepping, Some(s)) => {
            let width = 28usize;
            let filled = ((s.fraction_complete * width as f64).round() as usize).min(width);
            let bar = format!(
                "{}{}",
                "#".repeat(filled),
                "-".repeat(width.saturating_sub(filled))
            );
            print!(
                "\r[{}] {:>6.2}%  t={:.4}/{:.4}s  step={}  elapsed={:.1}s",
                bar,
                s.fraction_complete * 100.0,
                s.sim_time,
                s.final_time,
                s.step,
                event.elapsed_wall_s
            );
            let _ = io::stdout().flush();
        }
        _ => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
            let mut line = format!(
                "\r{} {:?}  elapsed={:.2}s",
                spinner[spin_idx], event.stage, event.elapsed_wall_s
            );
            if let Some(msg) = &event.message {
                line.push_str(&format!("  {}", msg));
            }
            print!("{}", line);
            let _ = io::stdout().flush();
        }
    }
}
