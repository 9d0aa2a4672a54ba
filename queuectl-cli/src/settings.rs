//! Configuration commands.

use queuectl_common::config::Config;

use crate::output;

pub fn show(config: &Config) {
    println!("Configuration ({}):", config.path().display());
    println!("{}", output::config_table(config));
}

pub fn set(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    config.set(key, value)?;
    println!("Configuration updated: {key} = {value}");
    Ok(())
}

pub fn reset(config: &mut Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = inquire::Confirm::new("Reset the configuration to its defaults?")
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    config.reset()?;
    println!("Configuration reset to defaults");
    Ok(())
}
