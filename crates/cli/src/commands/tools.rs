//! `runbox tools`: list the built-in tools.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = runbox_tools::tool_catalog();

    println!("Built-in tools ({}):", catalog.len());
    for tool in &catalog {
        let summary = tool.description.lines().next().unwrap_or_default();
        println!("  {:<20} {summary}", tool.name);
    }

    Ok(())
}
