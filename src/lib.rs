pub mod actions;
pub mod actors;
mod assets;
mod config;
pub mod conversation;
pub mod dialogue;
pub mod orders;
pub mod persistence;
pub mod telemetry;
pub mod world;

pub use actions::context::ContextId;
pub use actions::definitions::ActionDefinitions;
pub use actions::kind::ActionKind;
pub use actions::outcome::{BeginError, Notice, Resolution, ResolutionBranch};
pub use actors::actor::{ActorId, ActorKind, ActorState};
pub use world::position::Position;
pub use world::state::World;
pub use world::time::GameTick;

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root)?;
    let summary = assets::scan(&config.root)?;
    let defs = actions::definitions::ActionDefinitions::load_from_root(&config.root)?;
    let dialogue_report = dialogue::script::validate_dialogues(&config.root.join("dialogue"));
    let story_report =
        persistence::saves::StorySaveStore::from_root(&config.root).validate_story_saves();

    telemetry::logging::log_game(&format!(
        "asset scan: dialogue={}, actions={}, stories={}, orders={}",
        summary.dialogue_files, summary.action_files, summary.story_files, summary.order_files
    ));
    println!("moonshard: asset scan");
    println!("- root: {}", config.root.display());
    println!("- tick length: {}ms", config.tick_millis);
    if config.autosave_interval_seconds > 0 {
        println!("- autosave every {}s", config.autosave_interval_seconds);
    }
    println!("- dialogue files: {}", summary.dialogue_files);
    println!("- action files: {}", summary.action_files);
    println!(
        "- dialogue scripts: files={}, parsed={}, errors={}",
        dialogue_report.files,
        dialogue_report.parsed,
        dialogue_report.errors.len()
    );
    if !dialogue_report.errors.is_empty() {
        for err in &dialogue_report.errors {
            eprintln!("moonshard: dialogue validate {}", err);
        }
    }
    if story_report.missing_dir {
        println!("- story saves: missing save/stories directory");
    } else {
        println!(
            "- story saves: files={}, parsed={}, errors={}, skipped={}",
            story_report.story_files,
            story_report.parsed,
            story_report.errors.len(),
            story_report.skipped
        );
    }
    if !story_report.errors.is_empty() {
        for err in &story_report.errors {
            eprintln!("moonshard: story validate {}", err);
        }
    }
    println!(
        "- aid delay: self {}ms, other {}ms, resurrect +{}ms",
        defs.aid.self_delay_ms, defs.aid.other_delay_ms, defs.aid.resurrect_extra_ms
    );
    println!(
        "- aid range: {} tiles, elevation limit {}",
        defs.aid.max_range, defs.aid.elevation_limit
    );
    Ok(())
}
