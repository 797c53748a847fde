use std::{env, fs, path::PathBuf, process::Command};

const CONFIG: &str = r#"
[population]
n_hosts = 150
k = 0.35
rho = [0.22, 1.88, 1.0]
contact_age_breaks = [0.0, 5.0, 15.0]
treatment_age_breaks = [0.0, 2.0, 5.0, 16.0]
vacc_age_breaks = [0.0, 1.0, 2.0, 5.0]
prop_never_compliers = 0.1
host_age_breaks = [0.0, 1.0, 5.0, 50.0]
host_death_rates = [0.05, 0.01, 0.02, 0.2]
max_age = 100.0

[worms]
repro_func = "epgMonog"
lambda_egg = 3.0
gamma = 0.0007
z = 0.96
k_epg = 0.87
sigma = 0.1754
psi = 1.0
decay_rate = 5.0

[vaccine]
v1 = [1.0, 1.2]
v2 = [1.0, 0.5]
v3 = [1.0, 0.8]
waning_rate = 0.1

[drugs]
efficacy = 0.87
efficacy1 = 0.87
efficacy2 = 0.95
drug1_years = [1.0]
drug1_split = [0.6]
drug2_years = [1.0]
drug2_split = [0.4]

[survey]
min_age = 5.0
max_age = 15.0

[run]
seed = 42
max_time = 3.0
dt = 0.25
batch_size = 4
init_worms = 4
init_free_living = 1.0

[[interventions]]
kind = "chemo_age_range"
time = 1.0
min_age = 5.0
max_age = 15.0
coverage = 0.75

[[interventions]]
kind = "vaccine_age_range"
time = 1.5
min_age = 0.0
max_age = 10.0
coverage = 0.5

[[interventions]]
kind = "survey"
time = 2.0
sample_size = 50
n_samples = 2

[[interventions]]
kind = "survey_two"
time = 3.0
sample_size = 150
n_samples = 1
"#;

fn run_bin(args: &[&str]) -> std::process::Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_helminth"));
    Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn assert_success(args: &[&str]) {
    let output = run_bin(args);
    let stdout_str = String::from_utf8_lossy(&output.stdout);
    let stderr_str = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    fs::write(&config_path, CONFIG).expect("failed to write config file");
    let config_str = config_path
        .to_str()
        .expect("failed to convert config path to string");

    assert_success(&["--config", config_str, "check"]);
    assert_success(&["--config", config_str, "run"]);
    assert_success(&["--config", config_str, "run", "--runs", "3", "--threads", "2"]);

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("invalid_config_fails");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config = CONFIG.replace("\"epgMonog\"", "\"epgUnknown\"");
    fs::write(&config_path, config).expect("failed to write config file");
    let config_str = config_path
        .to_str()
        .expect("failed to convert config path to string");

    let output = run_bin(&["--config", config_str, "check"]);
    assert!(!output.status.success());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn library_run_is_reproducible() {
    let cfg = helminth::Config::from_toml(CONFIG).expect("failed to parse config");
    cfg.validate().expect("failed to validate config");

    let first = helminth::Engine::with_seed(cfg.clone(), 5)
        .and_then(|mut engine| engine.run())
        .expect("failed to run first engine");
    let second = helminth::Engine::with_seed(cfg, 5)
        .and_then(|mut engine| engine.run())
        .expect("failed to run second engine");

    assert_eq!(first.surveys.len(), 2);
    assert_eq!(first.counters.num_survey, 1);
    assert_eq!(first.counters.num_survey_two, 1);
    assert_eq!(first.seed, second.seed);
    assert_eq!(first.counters, second.counters);
    assert_eq!(first.mean_worm_burden, second.mean_worm_burden);
}
