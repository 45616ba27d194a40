use crate::ExportError;
use distrobox_schema::{
    is_inside_container, rooted, shell_quote, ContainerName, SchemaError, HOST_PREFIX,
};
use std::path::{Path, PathBuf};

/// How arguments are quoted in the generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// POSIX shell, also accepted by systemd `Exec*=` lines.
    Shell,
    /// Desktop entry `Exec` keys: double quotes with `"`, `` ` ``, `$` and
    /// `\` escaped, then every backslash doubled again for the string value.
    Desktop,
}

impl Quoting {
    pub fn quote(self, s: &str) -> String {
        match self {
            Self::Shell => shell_quote(s),
            Self::Desktop => {
                if !s.is_empty()
                    && !s
                        .chars()
                        .any(|c| c.is_whitespace() || "\"'\\`$<>|&;*?#()".contains(c))
                {
                    return s.to_owned();
                }
                let mut quoted = String::with_capacity(s.len() + 2);
                quoted.push('"');
                for c in s.chars() {
                    match c {
                        '\\' => quoted.push_str("\\\\\\\\"),
                        '"' | '`' | '$' => {
                            quoted.push_str("\\\\");
                            quoted.push(c);
                        }
                        _ => quoted.push(c),
                    }
                }
                quoted.push('"');
                quoted
            }
        }
    }
}

/// Everything an export needs to know about where it runs.
#[derive(Debug, Clone)]
pub struct ExportContext {
    /// Filesystem root of the container; `/` outside tests.
    pub root: PathBuf,
    pub container: String,
    /// Home directory of the host user.
    pub home: PathBuf,
    /// Host path of the `distrobox` command.
    pub enter_path: String,
    /// Appended verbatim to every exported command line.
    pub extra_flags: String,
    pub sudo: bool,
}

impl ExportContext {
    /// Container name from `CONTAINER_ID`, else `/etc/hostname`; home from
    /// `HOME`; enter path from `DISTROBOX_ENTER_PATH`. The container name
    /// must be a valid engine name, since it is written into every export.
    pub fn from_env(
        root: &Path,
        getenv: impl Fn(&str) -> Option<String>,
        extra_flags: &str,
        sudo: bool,
    ) -> Result<Self, ExportError> {
        let container = match getenv("CONTAINER_ID").filter(|v| !v.trim().is_empty()) {
            Some(id) => id.trim().to_owned(),
            None => std::fs::read_to_string(rooted(root, "/etc/hostname"))
                .map(|h| h.trim().to_owned())
                .ok()
                .filter(|h| !h.is_empty())
                .ok_or(SchemaError::MissingEnv("CONTAINER_ID"))?,
        };
        let container = ContainerName::new(container)?.into_inner();
        let home = getenv("HOME")
            .filter(|h| !h.is_empty())
            .ok_or(SchemaError::MissingEnv("HOME"))?;
        let enter_path = getenv("DISTROBOX_ENTER_PATH")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "distrobox".to_owned());

        Ok(Self {
            root: root.to_path_buf(),
            container,
            home: PathBuf::from(home),
            enter_path,
            extra_flags: extra_flags.trim().to_owned(),
            sudo,
        })
    }

    pub fn require_container(&self) -> Result<(), ExportError> {
        if is_inside_container(&self.root) {
            Ok(())
        } else {
            Err(ExportError::NotInContainer)
        }
    }

    /// `<enter> enter <container> --`, the part every exported command
    /// starts with. Used to recognize files this tool wrote.
    pub fn enter_command(&self, quoting: Quoting) -> String {
        format!(
            "{} enter {} --",
            quoting.quote(&self.enter_path),
            quoting.quote(&self.container)
        )
    }

    /// [`enter_command`](Self::enter_command) plus `sudo` when requested.
    pub fn routing_prefix(&self, quoting: Quoting) -> String {
        let mut prefix = self.enter_command(quoting);
        if self.sudo {
            prefix.push_str(" sudo");
        }
        prefix
    }

    /// A path inside the container filesystem.
    pub fn in_container(&self, path: impl AsRef<Path>) -> PathBuf {
        rooted(&self.root, path)
    }

    /// A path on the host, reached through the host bind prefix.
    pub fn on_host(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let host = Path::new(HOST_PREFIX).join(path.strip_prefix("/").unwrap_or(path));
        rooted(&self.root, host)
    }

    /// A path below the host user's home, reached through the host prefix.
    pub fn host_home(&self, relative: &str) -> PathBuf {
        self.on_host(self.home.join(relative))
    }
}
