#[tokio::main]
async fn main() {
    if let Err(e) = symptom_checker::run().await {
        eprintln!("symptom-checker: {e}");
        std::process::exit(1);
    }
}
