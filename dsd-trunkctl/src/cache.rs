use std::path::PathBuf;

use dsd_trunk_core::cache::CandidateCache;

#[derive(clap::Args, Debug)]
pub struct CacheOpts {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommand {
    /// Print the candidate frequencies currently on disk for a site.
    Show(ShowOpts),
    /// Hand-construct a candidate cache file, for testing C1 without a
    /// live receiver.
    Seed(SeedOpts),
}

#[derive(clap::Args, Debug)]
struct ShowOpts {
    /// WACN:SYSID:NAC, all hex, e.g. BEE00:1A2:293
    #[arg(long)]
    site: String,
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct SeedOpts {
    #[arg(long)]
    site: String,
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Frequencies in Hz to seed the cache with, in order.
    #[arg(required = true)]
    freqs: Vec<u64>,
}

impl crate::ToolRun for CacheOpts {
    fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            CacheCommand::Show(o) => o.run(),
            CacheCommand::Seed(o) => o.run(),
        }
    }
}

impl ShowOpts {
    fn run(&self) -> anyhow::Result<()> {
        let site = crate::common::parse_site(&self.site)?;
        let dir = self.dir.clone().unwrap_or_else(CandidateCache::default_cache_dir);
        let cache = CandidateCache::load(&dir, &site);

        println!("cache file: {}", CandidateCache::file_path(&dir, &site).display());
        for freq in cache.frequencies() {
            println!("{freq}");
        }
        println!("-- {} entr{} --", cache.len(), if cache.len() == 1 { "y" } else { "ies" });

        Ok(())
    }
}

impl SeedOpts {
    fn run(&self) -> anyhow::Result<()> {
        let site = crate::common::parse_site(&self.site)?;
        let dir = self.dir.clone().unwrap_or_else(CandidateCache::default_cache_dir);

        let mut cache = CandidateCache::new();
        for freq in &self.freqs {
            cache.add(*freq, true);
        }
        cache.persist(&dir, &site);

        println!("wrote {} entries to {}", cache.len(), CandidateCache::file_path(&dir, &site).display());
        Ok(())
    }
}
