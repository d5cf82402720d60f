use filetrigger_azure::FileTrigger;

pub async fn run(trigger: &FileTrigger) -> anyhow::Result<()> {
    match trigger.health_check().await {
        Ok(()) => {
            println!("Azure services are reachable.");
            Ok(())
        }
        Err(e) => {
            eprintln!("Health check failed: {e}");
            std::process::exit(1);
        }
    }
}
