use crate::error::AppResult;
use crate::store::{Stage, StageCounts, Store};

/// Per-stage counts followed by the ids waiting on each stage.
pub fn status(store: &Store) -> AppResult<()> {
    let counts = store.stage_counts()?;
    println!("{}", render_counts(&counts));

    for stage in Stage::ALL {
        let backlog = store.backlog(stage)?;
        if backlog.is_empty() {
            continue;
        }
        println!();
        println!("Waiting for {}:", stage);
        for item in backlog {
            println!("  {}  {}  {}", item.id(), item.metadata().date, item.metadata().title);
        }
    }

    Ok(())
}

fn render_counts(counts: &[StageCounts]) -> String {
    let mut out = format!("{:<12} {:>6} {:>8}", "stage", "done", "backlog");
    for c in counts {
        out.push_str(&format!("\n{:<12} {:>6} {:>8}", c.stage, c.done, c.backlog));
    }
    out
}
