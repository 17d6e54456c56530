use std::path::PathBuf;

use clap::Parser;
use lloggs::LoggingArgs;

use barrow::{run_backup, BackupConfig, BackupProgress};

#[derive(Parser, Debug)]
#[command(name = "barrow")]
#[command(about = "Incremental snapshot backup for directory trees")]
struct Args {
    /// Source directory (or single file) to back up
    #[arg(long, short)]
    source: PathBuf,

    /// Backup root directory
    #[arg(long, short)]
    backup: PathBuf,

    #[command(flatten)]
    logging: LoggingArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let verbose = args.logging.verbose > 0;
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    let mut config = BackupConfig {
        source_dir: args.source,
        backup_root: args.backup.clone(),
        // The catalogue always lives inside the backup root.
        database_file: args.backup.join("backup.db"),
        verbose,
        on_progress: None,
    };

    if verbose {
        config.on_progress = Some(Box::new(|progress: &BackupProgress| {
            println!(
                "[{}] {}/{} : {}",
                progress.stage,
                progress.processed,
                progress.total,
                progress.file.display()
            );
        }));
    }

    if !run_backup(config) {
        eprintln!("Backup failed");
        std::process::exit(1);
    }

    if verbose {
        println!("Backup completed successfully");
    }
    Ok(())
}
