use clap::Parser;
use kite_cli::{load_descriptions, run, Cli, CliError};
use kite_schema::{ApiDescription, ApiField, ApiObjectType, ApiType, FieldFlags, ScalarType};
use std::path::PathBuf;

fn shop(api: &str, number: ScalarType) -> ApiDescription {
    let order = ApiObjectType::new("Order")
        .with_field(ApiField::scalar("number", number, FieldFlags::IS_KEY | FieldFlags::QUERYABLE).unwrap())
        .with_field(ApiField::scalar("status", ScalarType::String, FieldFlags::QUERYABLE).unwrap());
    let mut description = ApiDescription::new(api, "Shop");
    description.fields =
        vec![ApiField::object("orders", "Order", FieldFlags::IS_CONNECTION | FieldFlags::QUERYABLE).unwrap()];
    description.types = vec![ApiType::Object(order)];
    description
}

fn write(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kite-cli-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_descriptions_load_from_objects_and_arrays() {
    let single = write("single.json", &serde_json::to_string(&shop("east", ScalarType::Integer)).unwrap());
    let many = write(
        "many.json",
        &serde_json::to_string(&vec![shop("west", ScalarType::Integer), shop("north", ScalarType::Integer)]).unwrap(),
    );

    let descriptions = load_descriptions(&[single, many]).unwrap();
    let names: Vec<_> = descriptions.iter().map(|d| d.api_name.as_str()).collect();
    assert_eq!(names, vec!["east", "west", "north"]);
}

#[test]
fn test_load_errors_name_the_file() {
    let broken = write("broken.json", "{ not json");
    let error = load_descriptions(&[broken.clone()]).unwrap_err();
    assert!(matches!(error, CliError::Json { ref path, .. } if *path == broken));

    let missing = std::env::temp_dir().join("kite-cli-does-not-exist.json");
    assert!(matches!(load_descriptions(&[missing]), Err(CliError::Io { .. })));
}

#[test]
fn test_check_exit_codes() {
    let east = write("east.json", &serde_json::to_string(&shop("east", ScalarType::Integer)).unwrap());
    let west = write("west.json", &serde_json::to_string(&shop("west", ScalarType::Integer)).unwrap());
    let odd = write("odd.json", &serde_json::to_string(&shop("odd", ScalarType::String)).unwrap());

    let ok = Cli::parse_from(["kite", "--quiet", "check", east.to_str().unwrap(), west.to_str().unwrap()]);
    assert_eq!(run(ok).unwrap(), 0);

    let conflicting = Cli::parse_from(["kite", "--quiet", "check", east.to_str().unwrap(), odd.to_str().unwrap()]);
    assert_eq!(run(conflicting).unwrap(), 1);
}
