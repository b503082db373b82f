use std::path::{Path, PathBuf};

use fd_app::{CheckRequest, SessionOptions, SolverSession, check_against_reference, export_run};
use fd_results::AsciiTable;

const THREE_STEPS: &str = "
version: 1
name: three-steps
settings:
  stop_time: 0.03
  time_step: 0.01
dofs:
  - { id: mast, mass: 5.0, stiffness: 2000.0, damping: 2.0 }
  - { id: top, mass: 1.0, stiffness: 500.0 }
functions:
  - id: 1
    name: wind
    kind: { type: Ramp, slope: 100.0, max_value: 2.0 }
loads:
  - { dof: top, scale: 1.5, function: 1 }
sensors:
  - id: 2
    name: top position
    quantity: { type: Position, dof: top }
  - id: 3
    name: top velocity
    quantity: { type: Velocity, dof: top }
  - id: 4
    name: mast force
    quantity: { type: SpringForce, dof: mast }
";

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fd_app_check_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn request<'a>(model: &'a Path, reference: &'a Path) -> CheckRequest<'a> {
    CheckRequest {
        model_path: model,
        reference_path: reference,
        tolerance: 1e-8,
        skip_rows: 0,
        options: SessionOptions {
            results_database: false,
            ..SessionOptions::default()
        },
    }
}

/// Solve the model once and return its response as a reference table.
fn reference_table(model: &Path) -> AsciiTable {
    let mut session = SolverSession::new(SessionOptions {
        write_back: false,
        results_database: false,
        ..SessionOptions::default()
    });
    assert_eq!(session.run_all(model).unwrap(), 0);
    session.history().to_table()
}

#[test]
fn identical_reference_has_no_discrepancies() {
    let dir = temp_dir("identical");
    let model = dir.join("three.yaml");
    std::fs::write(&model, THREE_STEPS).unwrap();

    let table = reference_table(&model);
    assert_eq!(table.len(), 3);
    assert_eq!(table.rows[0].len(), 5);
    let reference = dir.join("reference.txt");
    std::fs::write(&reference, table.to_ascii()).unwrap();

    let report = check_against_reference(request(&model, &reference), None).unwrap();
    assert_eq!(report.comparison.checked_steps, 3);
    assert_eq!(report.comparison.discrepancies, 0);
    assert_eq!(report.exit_code(), 0);
    assert!(report.passed());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn perturbed_reference_counts_each_mismatch() {
    let dir = temp_dir("perturbed");
    let model = dir.join("three.yaml");
    std::fs::write(&model, THREE_STEPS).unwrap();

    let mut table = reference_table(&model);
    table.rows[1][2] += 1e-3;
    table.rows[2][4] -= 0.5;
    let reference = dir.join("reference.txt");
    std::fs::write(&reference, table.to_ascii()).unwrap();

    let report = check_against_reference(request(&model, &reference), None).unwrap();
    assert_eq!(report.comparison.discrepancies, 2);
    assert_eq!(report.error_code, 0);
    assert_eq!(report.exit_code(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn initial_reference_row_can_be_skipped() {
    let dir = temp_dir("skip");
    let model = dir.join("three.yaml");
    std::fs::write(&model, THREE_STEPS).unwrap();

    let mut table = reference_table(&model);
    table.rows.insert(0, vec![0.0; 5]);
    let reference = dir.join("reference.txt");
    std::fs::write(&reference, table.to_ascii()).unwrap();

    let unskipped = check_against_reference(request(&model, &reference), None).unwrap();
    assert!(!unskipped.passed());

    let skipped = check_against_reference(
        CheckRequest {
            skip_rows: 1,
            ..request(&model, &reference)
        },
        None,
    )
    .unwrap();
    assert!(skipped.passed());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn check_leaves_model_and_database_untouched() {
    let dir = temp_dir("untouched");
    let model = dir.join("three.yaml");
    std::fs::write(&model, THREE_STEPS).unwrap();
    let reference = dir.join("reference.txt");
    std::fs::write(&reference, reference_table(&model).to_ascii()).unwrap();

    let report = check_against_reference(
        CheckRequest {
            options: SessionOptions::default(),
            ..request(&model, &reference)
        },
        None,
    )
    .unwrap();
    assert!(report.passed());
    assert!(!dir.join("three_RDB").exists());
    assert!(fd_model::load_model(&model).unwrap().stored_results().is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn exported_run_reads_back_as_reference() {
    let dir = temp_dir("export");
    let model = dir.join("three.yaml");
    std::fs::write(&model, THREE_STEPS).unwrap();

    let mut session = SolverSession::default();
    assert_eq!(session.run_all(&model).unwrap(), 0);
    let run_id = fd_app::list_runs(&model).unwrap()[0].run_id.clone();

    let exported = dir.join("exported.txt");
    assert_eq!(export_run(&model, &run_id, &exported).unwrap(), 3);

    let table = AsciiTable::from_file(&exported).unwrap();
    assert_eq!(table.columns, vec!["time", "f1", "f2", "f3", "f4"]);

    let report = check_against_reference(request(&model, &exported), None).unwrap();
    assert!(report.passed());

    let _ = std::fs::remove_dir_all(&dir);
}
