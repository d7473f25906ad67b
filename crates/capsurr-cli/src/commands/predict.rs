use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use capsurr_surrogate::{predict_csv, SurrogateModel};

use super::load_study;
use super::telemetry::record_run_timed;

/// `<stem>-predictions.csv` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".into());
    input.with_file_name(format!("{stem}-predictions.csv"))
}

pub fn handle(
    config_path: &Path,
    model: Option<&PathBuf>,
    input: &Path,
    output: Option<&PathBuf>,
) -> Result<()> {
    let model_path = match model {
        Some(path) => path.clone(),
        None => load_study(config_path)?.surrogate.model_path,
    };
    let output = output.cloned().unwrap_or_else(|| default_output(input));
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let surrogate = SurrogateModel::load(&model_path)?;
        let rows = predict_csv(&surrogate, input, &output)?;
        println!("Predicted {} row(s) into {}", rows, output.display());
        Ok(())
    })();
    let model_param = model_path.display().to_string();
    let input_param = input.display().to_string();
    record_run_timed(
        &output,
        "predict",
        &[
            ("model", model_param.as_str()),
            ("input", input_param.as_str()),
        ],
        start,
        &res,
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("runs/points.csv")),
            PathBuf::from("runs/points-predictions.csv")
        );
    }
}
