//! Full set-up pipeline: configuration file, lattice, ghosts and stepping.

use std::fs;
use std::path::PathBuf;

use orchestrator::{ballistic_drift, create_driver, DriverState, OrchestratorError};

const SHOCK_TUBE: &str = r#"{
    "name": "sod shock tube",
    "boundaries": [
        {
            "kind": {"mirror": "free_slip"},
            "range_min": -0.5,
            "range_max": 1.5,
            "enable_lower": true,
            "enable_upper": true,
            "spacing_lower": 0.0025,
            "spacing_upper": 0.02
        }
    ],
    "tree": {"leaf_capacity": 4, "workers": 1},
    "lattice": [
        {"min": [-0.5], "max": [0.0], "spacing": 0.0025, "density": 1.0},
        {"min": [0.0], "max": [1.5], "spacing": 0.02, "density": 0.125}
    ],
    "max_steps": 5
}"#;

const PERIODIC_BOX: &str = r#"{
    "name": "periodic box",
    "boundaries": [
        {"kind": "periodic", "range_min": 0.0, "range_max": 1.0,
         "enable_lower": true, "enable_upper": true,
         "spacing_lower": 0.05, "spacing_upper": 0.05},
        {"kind": "periodic", "range_min": 0.0, "range_max": 1.0,
         "enable_lower": true, "enable_upper": true,
         "spacing_lower": 0.05, "spacing_upper": 0.05}
    ],
    "tree": {"periodic_images": true},
    "lattice": [
        {"min": [0.0, 0.0], "max": [1.0, 1.0], "spacing": 0.05, "density": 1.0,
         "velocity": [0.3, -0.2]}
    ]
}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "orchestrator-{}-{name}.json",
        std::process::id()
    ));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_shock_tube_driver() {
    init_tracing();
    let path = write_config("shock-tube", SHOCK_TUBE);
    let mut driver = create_driver::<1>(path.to_str().unwrap()).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(driver.particles().len(), 275);
    let step = driver.current().unwrap().clone();
    assert_eq!(step.generation(), 1);
    assert_eq!(step.real_count(), 275);
    assert!(step.ghost_count() > 0);

    // Every ghost sits outside the walls at -0.50125 and 1.51.
    let seq = step.sequence();
    for i in seq.real_count()..seq.len() {
        let x = seq.get(i).unwrap().position[0];
        assert!(x < -0.50125 || x > 1.51, "ghost {i} at {x}");
        assert_eq!(seq.is_ghost(i), Some(true));
    }

    // The left-most real particle sees its own mirror image.
    let list = step.query_neighbors(0, step.interaction_radius()).unwrap();
    assert!(list.identities.iter().any(|&id| seq.is_ghost(id) == Some(true)));

    assert_eq!(driver.max_steps(), Some(5));
    let done = driver.run_to_limit(ballistic_drift(1e-4)).unwrap();
    assert_eq!(done, 5);
    assert_eq!(driver.state(), DriverState::Finished);
    assert!(driver.advance(ballistic_drift(1e-4)).is_err());

    // The step kept from before the run is stale now.
    assert!(driver.coordinator().ensure_current(&step).is_err());
    let current = driver.current().unwrap();
    assert_eq!(current.generation(), 6);
    assert!(driver.coordinator().ensure_current(current).is_ok());
}

#[test]
fn test_periodic_images_driver() {
    init_tracing();
    let path = write_config("periodic-box", PERIODIC_BOX);
    let mut driver = create_driver::<2>(path.to_str().unwrap()).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(driver.particles().len(), 400);
    // Minimum image replaces periodic ghosts.
    assert_eq!(driver.current().unwrap().ghost_count(), 0);

    assert_eq!(driver.max_steps(), None);
    driver.run(20, ballistic_drift(0.05)).unwrap();
    assert_eq!(driver.state(), DriverState::Ready);
    for p in driver.particles().iter() {
        for d in 0..2 {
            assert!((0.0..=1.0).contains(&p.position[d]), "position {:?}", p.position);
        }
    }

    // Radius 0.13 on a 0.05 lattice: offsets with i*i + j*j in {1, 2, 4, 5}.
    // Particles on the seams see the same 20 neighbors through the images.
    let step = driver.current().unwrap();
    let radius = step.interaction_radius();
    assert!((radius - 0.13).abs() < 1e-9);
    for i in 0..step.real_count() {
        assert_eq!(step.query_neighbors(i, radius).unwrap().count(), 20, "particle {i}");
    }
}

#[test]
fn test_missing_config_file() {
    let err = create_driver::<1>("does/not/exist.json").unwrap_err();
    assert!(matches!(err, OrchestratorError::Io { .. }), "{err}");
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let path = write_config("mismatch", SHOCK_TUBE);
    let result = create_driver::<2>(path.to_str().unwrap());
    fs::remove_file(&path).ok();
    assert!(result.is_err());
}
