//! `drydock clean` command

use anyhow::Result;

use super::project_context;
use crate::cli::CleanArgs;
use drydock::builder::DependStore;
use drydock::util::fs::remove_dir_all_if_exists;

pub fn execute(args: CleanArgs) -> Result<()> {
    let ctx = project_context(args.manifest_path)?;

    let store = ctx.depend_store_path();
    DependStore::remove(&store)?;
    eprintln!("     Removed {}", store.display());

    if args.all {
        let build_dir = ctx.build_dir();
        remove_dir_all_if_exists(&build_dir)?;
        eprintln!("     Removed {}", build_dir.display());
    }

    Ok(())
}
