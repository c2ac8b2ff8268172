/// Script family of the replay script. Each dialect knows its file name,
/// comment marker, header and command prefix.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ScriptDialect {
    /// POSIX shell, `update.sh`.
    Shell,
    /// Windows batch, `update.bat`.
    Batch,
}

impl ScriptDialect {
    /// Dialect of the operating system the bundle is built on.
    pub fn host() -> Self {
        if cfg!(windows) {
            ScriptDialect::Batch
        } else {
            ScriptDialect::Shell
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptDialect::Shell => "update.sh",
            ScriptDialect::Batch => "update.bat",
        }
    }

    fn comment_mark(self) -> &'static str {
        match self {
            ScriptDialect::Shell => "#",
            ScriptDialect::Batch => "::",
        }
    }

    fn header(self) -> &'static str {
        match self {
            ScriptDialect::Shell => "#!/bin/bash\n",
            ScriptDialect::Batch => "",
        }
    }

    fn command_prefix(self) -> &'static str {
        match self {
            ScriptDialect::Shell => "",
            ScriptDialect::Batch => "call ",
        }
    }
}

/// Content of the replay script.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayScript {
    /// Copied verbatim before the install commands.
    pub preamble: Option<String>,
    /// Conda artifacts relative to the bundle root.
    pub conda_packages: Option<Vec<String>>,
    pub pip: bool,
}

impl ReplayScript {
    pub fn render(&self, dialect: ScriptDialect) -> String {
        let comment = dialect.comment_mark();
        let prefix = dialect.command_prefix();

        let mut script = String::from(dialect.header());
        if let Some(preamble) = &self.preamble {
            script.push_str(preamble);
            script.push('\n');
        }
        if let Some(packages) = &self.conda_packages {
            script.push_str(&format!("{comment} install conda packages\n"));
            script.push_str(&format!(
                "{prefix}conda install {} --offline\n",
                packages.join(" ")
            ));
        }
        if self.pip {
            script.push_str(&format!("{comment} install pip packages\n"));
            script.push_str(&format!(
                "{prefix}pip install --no-index --find-links=pip/downloaded -r pip/requirements.txt\n"
            ));
        }
        script
    }
}
