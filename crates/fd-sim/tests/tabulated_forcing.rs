use std::path::PathBuf;

use fd_core::FunctionId;
use fd_model::{DofDef, FunctionDef, FunctionKind, LoadDef, ModelDef, SensorDef, SensorQuantity, SolverSettings};
use fd_sim::{IntegratorPhase, TabulatedFunctions, TimeIntegrator};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fd_sim_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn two_mass_model(load: FunctionKind) -> ModelDef {
    let id = |raw| FunctionId::new(raw).unwrap();
    ModelDef {
        version: 1,
        name: "two-mass".to_string(),
        settings: SolverSettings {
            stop_time: 0.2,
            time_step: 0.005,
            ..SolverSettings::default()
        },
        dofs: vec![
            DofDef {
                id: "base".to_string(),
                mass: 2.0,
                stiffness: 800.0,
                damping: 1.0,
                initial_displacement: 0.0,
                initial_velocity: 0.0,
            },
            DofDef {
                id: "top".to_string(),
                mass: 1.0,
                stiffness: 300.0,
                damping: 0.5,
                initial_displacement: 0.0,
                initial_velocity: 0.0,
            },
        ],
        rayleigh: None,
        functions: vec![FunctionDef {
            id: id(1),
            name: "push".to_string(),
            kind: load,
        }],
        loads: vec![LoadDef {
            dof: "top".to_string(),
            scale: 2.0,
            function: id(1),
        }],
        sensors: vec![
            SensorDef {
                id: id(10),
                name: "top position".to_string(),
                quantity: SensorQuantity::Position {
                    dof: "top".to_string(),
                },
            },
            SensorDef {
                id: id(11),
                name: "base spring".to_string(),
                quantity: SensorQuantity::SpringForce {
                    dof: "base".to_string(),
                },
            },
        ],
        results: None,
    }
}

fn run(integrator: &mut TimeIntegrator, model: &ModelDef) -> Vec<(f64, f64)> {
    integrator.initialize(model).unwrap();
    let mut rows = Vec::new();
    loop {
        let more = integrator.solve_next().unwrap();
        rows.push((
            integrator.get_function(10).unwrap(),
            integrator.get_function(11).unwrap(),
        ));
        if !more {
            break;
        }
    }
    assert_eq!(integrator.phase(), IntegratorPhase::Completed);
    assert_eq!(integrator.finalize(), 0);
    rows
}

#[test]
fn tabulated_file_matches_polyline_function() {
    let points = vec![(0.0, 0.0), (0.05, 1.0), (0.1, 1.0), (0.15, -0.5)];

    let dir = temp_dir("tabulated");
    let path = dir.join("push.txt");
    let mut text = String::from("# pulse\n#DESC time push\n");
    for (t, v) in &points {
        text.push_str(&format!("{t} {v}\n"));
    }
    std::fs::write(&path, text).unwrap();

    let functions = TabulatedFunctions::from_file(&path).unwrap();
    assert_eq!(functions.channel_count(), 1);

    let mut external = TimeIntegrator::new(Box::new(functions));
    let from_file = run(
        &mut external,
        &two_mass_model(FunctionKind::External { channel: 1 }),
    );

    let mut builtin = TimeIntegrator::default();
    let from_polyline = run(&mut builtin, &two_mass_model(FunctionKind::Polyline { points }));

    assert_eq!(from_file.len(), 40);
    assert_eq!(from_file, from_polyline);
    assert!(from_file.iter().any(|(u, _)| u.abs() > 1e-6));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn base_spring_carries_static_load() {
    // A constant load on a damped chain settles where the base spring
    // carries the whole load.
    let mut model = two_mass_model(FunctionKind::Constant { value: 5.0 });
    model.settings.stop_time = 30.0;
    model.settings.time_step = 0.01;
    model.rayleigh = Some(fd_model::RayleighDef {
        alpha: 2.0,
        beta: 0.0,
    });

    let mut integrator = TimeIntegrator::default();
    integrator.initialize(&model).unwrap();
    while integrator.solve_next().unwrap() {}

    let base_force = integrator.get_function(11).unwrap();
    assert!((base_force - 10.0).abs() < 1e-3, "base force {base_force}");
    let top = integrator.get_function(10).unwrap();
    assert!((top - (10.0 / 800.0 + 10.0 / 300.0)).abs() < 1e-5, "top {top}");
}
