pub mod run;

use anyhow::{Context, Result};
use disposables::EngineContext;
use std::io;

pub fn logs(ctx: &EngineContext, id: &str, follow: bool) -> Result<()> {
    if follow {
        let mut stream = ctx
            .stream(["logs", "-f", id])
            .with_context(|| format!("failed to follow logs of {}", id))?;
        io::copy(&mut stream, &mut io::stdout().lock())
            .with_context(|| format!("log stream of {} broke off", id))?;
        stream.close()?;
        return Ok(());
    }

    let output = ctx
        .invoke(["logs", id])
        .with_context(|| format!("failed to read logs of {}", id))?;
    println!("{}", output);
    Ok(())
}
