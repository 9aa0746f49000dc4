//! Environment overrides for run settings
//!
//! Kept in its own test binary: environment variables are process-wide.

use pkmod::prelude::*;
use std::io::Write;

const PK: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/models/pkExample.cpp");

#[test]
fn test_environment_overrides_settings_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[solver]\nend = 48\ndelta = 0.5\n[param]\nVC = 12\n")
        .unwrap();

    std::env::set_var("PKMOD_PARAM__CL", "3");
    std::env::set_var("PKMOD_INIT__GUT", "100");
    std::env::set_var("PKMOD_SOLVER__END", "2");
    std::env::set_var("PKMOD_LOG__LEVEL", "debug");

    let settings = Settings::from_file(file.path()).unwrap();
    let env_only = Settings::from_env().unwrap();

    for key in [
        "PKMOD_PARAM__CL",
        "PKMOD_INIT__GUT",
        "PKMOD_SOLVER__END",
        "PKMOD_LOG__LEVEL",
    ] {
        std::env::remove_var(key);
    }

    // Environment wins over the file, file values without a variable stay
    assert_eq!(settings.solver.end, Some(2.0));
    assert_eq!(settings.solver.delta, Some(0.5));
    assert_eq!(settings.log.level, "debug");
    assert_eq!(env_only.solver.end, Some(2.0));
    assert_eq!(env_only.solver.delta, None);

    // Lower-cased environment keys still resolve to the declared names
    let model = Model::from_path(PK).unwrap();
    let overrides = settings.overrides(model.file()).unwrap();
    assert_eq!(overrides.params.get("CL"), Some(&3.0));
    assert_eq!(overrides.params.get("VC"), Some(&12.0));
    assert_eq!(overrides.init.get("GUT"), Some(&100.0));
    assert_eq!(overrides.end, Some(2.0));

    let out = model.simulate(&overrides).unwrap();
    assert_eq!(out.times().to_vec(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    assert_eq!(out.value(0, "GUT"), Some(100.0));
}
