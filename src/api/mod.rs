use std::sync::Arc;

use crate::{
    bundle::{Bundle, BundleOptions},
    cli::command_handlers::{do_bundle, do_clean, do_resolve},
    fetch::Downloader,
    model::{PackageSource, ResolvedSet},
    pip::PipDownloader,
    progress::BundleProgress,
    resolver::CondaSolver,
};

mod builder;

pub use builder::CondafetchBuilder;

pub struct Condafetch {
    solver: Box<dyn CondaSolver>,
    pip: Box<dyn PipDownloader>,
    downloader: Arc<dyn Downloader>,
    progress: Arc<dyn BundleProgress>,
    options: BundleOptions,
}

impl Condafetch {
    pub fn builder() -> CondafetchBuilder {
        CondafetchBuilder::default()
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Downloads the dependencies and writes the offline bundle
    pub fn bundle(&self, source: &PackageSource) -> anyhow::Result<Bundle> {
        do_bundle(
            self.solver.as_ref(),
            self.pip.as_ref(),
            self.downloader.clone(),
            self.progress.clone(),
            &self.options,
            source,
        )
    }

    /// Resolves the conda dependencies without downloading anything
    pub fn resolve(&self, source: &PackageSource) -> anyhow::Result<ResolvedSet> {
        do_resolve(self.solver.as_ref(), source)
    }

    /// Deletes the bundle directory and its archive
    pub fn clean(&self) -> anyhow::Result<()> {
        do_clean(&self.options)
    }
}
