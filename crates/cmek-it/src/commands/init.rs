use cmek_harness::HarnessConfig;

pub fn init(project_id: &str, kms_key_name: &str) -> anyhow::Result<()> {
    let config = HarnessConfig::scaffold(project_id, kms_key_name);
    config.validate()?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
