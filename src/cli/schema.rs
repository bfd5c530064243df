//! Schema CLI command

use formflow::driver::service::FlowTemplate;
use formflow::*;

pub fn cmd_schema(args: &[String]) -> Result<()> {
    let schema_name = args.first().map(|s| s.as_str()).unwrap_or("driver");

    match schema_name {
        "list" => {
            println!("Available schemas: driver, config, flow, instructions");
            Ok(())
        }
        "driver" => {
            println!("{}", serde_json::to_string_pretty(&driver::driver_schema())?);
            Ok(())
        }
        "config" => print_schema::<EngineConfig>(),
        "flow" => print_schema::<FlowTemplate>(),
        "instructions" => print_schema::<FormFlowInstructions>(),
        _ => Err(format!("Unknown schema: {}", schema_name).into()),
    }
}

fn print_schema<T: schemars::JsonSchema>() -> Result<()> {
    let schema = schemars::schema_for!(T);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
