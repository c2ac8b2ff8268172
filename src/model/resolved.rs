use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
};

/// A conda package specifier handed to the solver as is.
#[derive(Clone, Hash, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct MatchSpec(String);

impl MatchSpec {
    pub fn new(s: impl Into<String>) -> Self {
        MatchSpec(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MatchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchSpec {
    fn from(s: &str) -> Self {
        MatchSpec(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPackage {
    pub url: String,
    pub file_name: String,
}

impl ResolvedPackage {
    pub fn new(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        ResolvedPackage {
            url: url.into(),
            file_name: file_name.into(),
        }
    }
}

/// Packages the solver decided to add, in the order it reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
    packages: Vec<ResolvedPackage>,
}

impl ResolvedSet {
    /// Builds a set, keeping the first occurrence of every url.
    pub fn new(packages: Vec<ResolvedPackage>) -> Self {
        let mut seen = HashSet::new();
        let packages = packages
            .into_iter()
            .filter(|package| seen.insert(package.url.clone()))
            .collect();
        ResolvedSet { packages }
    }

    pub fn packages(&self) -> &[ResolvedPackage] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Url to destination file name, one entry per package.
    pub fn fetch_map(&self) -> BTreeMap<String, String> {
        self.packages
            .iter()
            .map(|package| (package.url.clone(), package.file_name.clone()))
            .collect()
    }

    /// Paths of the artifacts relative to the bundle root, e.g. `conda/numpy-1.0.tar.bz2`.
    pub fn relative_paths(&self, directory: &str) -> Vec<String> {
        self.packages
            .iter()
            .map(|package| format!("{}/{}", directory, package.file_name))
            .collect()
    }
}

impl Display for ResolvedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, package) in self.packages.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&package.file_name)?;
        }
        Ok(())
    }
}
