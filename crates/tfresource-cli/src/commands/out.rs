use super::{json_pretty, EXIT_SUCCESS};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tfresource_core::Runner;
use tfresource_engine::EngineConfig;
use tfresource_schema::OutRequest;
use tracing::debug;

pub fn run(
    source_dir: &Path,
    request_path: Option<&Path>,
    engine_config: EngineConfig,
) -> Result<u8, String> {
    let request = read_request(request_path).map_err(|e| format!("invalid request: {e}"))?;
    debug!("engine: {}", engine_config.engine);

    let runner = Runner::new(source_dir).with_engine_config(engine_config);
    let response = runner
        .run(&request)
        .map_err(|e| format!("{}: {e}", e.kind()))?;
    println!("{}", json_pretty(&response)?);
    Ok(EXIT_SUCCESS)
}

fn read_request(path: Option<&Path>) -> Result<OutRequest, tfresource_schema::SchemaError> {
    match path {
        Some(path) => OutRequest::from_reader(BufReader::new(File::open(path)?)),
        None => OutRequest::from_reader(std::io::stdin().lock()),
    }
}
