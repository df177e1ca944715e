use std::fs;
use std::process;

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

pub fn settings_export() {
    print!("{}", smt_core::settings::default_toml());
}

pub fn settings_validate(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    let s = die!(
        smt_core::settings::parse_settings_toml(&content),
        "Error: {}"
    );
    println!(
        "OK: search.stack_size={}, search.beam_width={}, search.pop_limit={}, search.max_distortion={}",
        s.search.stack_size, s.search.beam_width, s.search.pop_limit, s.search.max_distortion
    );
}

pub fn model_validate(file: &str) {
    let model = die!(
        crate::model_file::load(std::path::Path::new(file)),
        "Error reading {file}: {}"
    );
    let phrases = match model.phrase_table() {
        Ok(table) => table.len(),
        Err(crate::model_file::ModelFileError::Missing(_)) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let rules = match model.grammars() {
        Ok(grammars) => grammars.iter().map(|g| g.len()).sum(),
        Err(crate::model_file::ModelFileError::Missing(_)) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    println!(
        "OK: {phrases} phrases, {rules} rules in {} grammars, {} weighted producers",
        model.grammars.len(),
        model.weights.len()
    );
}
