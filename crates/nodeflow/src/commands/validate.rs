use colored::Colorize;

pub fn handle() -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());

    let (path, config) = match super::load_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    println!("Config file: {}", path.display().to_string().cyan());
    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    for key in ["Region", "Bucket", "VPCCIDR", "DNSDomain", "StackPrefix"] {
        let value = config.str(key).unwrap_or_else(|| "(not set)".to_string());
        println!("  {key}: {}", value.cyan());
    }

    let zones: Vec<&str> = [("PublicDNSId", "public"), ("PrivateDNSId", "private")]
        .into_iter()
        .filter(|(key, _)| config.str(key).is_some())
        .map(|(_, zone)| zone)
        .collect();
    if zones.is_empty() {
        println!("  DNS zones: {}", "none".yellow());
    } else {
        println!("  DNS zones: {}", zones.join(", "));
    }
    if config.defers_tagging() {
        println!("  Tagging: deferred until after launch");
    }

    println!("  Subnet types: {}", config.subnet_types().len());
    for (name, subnet) in config.subnet_types() {
        println!(
            "    - {} ({}, {} subnets)",
            name.cyan(),
            subnet.cidr,
            subnet.subnets.len()
        );
    }
    println!("  Tags: {}", config.tags().len());
    for (key, value) in config.tags().iter() {
        println!("    - {key}={value}");
    }

    Ok(())
}
