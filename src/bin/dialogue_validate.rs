use moonshard::dialogue::script::validate_dialogues;
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: dialogue_validate <dialogue-dir>");
        std::process::exit(2);
    }
    let dir = Path::new(&args[1]);
    let report = validate_dialogues(dir);
    println!("dialogue dir: {}", dir.display());
    println!("files: {}", report.files);
    println!("parsed: {}", report.parsed);
    println!("errors: {}", report.errors.len());
    for err in &report.errors {
        eprintln!("- {}", err);
    }
    if !report.errors.is_empty() {
        std::process::exit(1);
    }
}
