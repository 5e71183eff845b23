//! One-shot jobs left to the task scheduler
//!
//! A deferred job is a cron drop-in running a command once, then deleting
//! itself. It outlives the process, which matters when the work would kill
//! the caller (upgrading the API serving the request, rebooting).

use hostadmin_config::ToolsConfig;
use std::path::PathBuf;

use crate::steps::Step;

const CRON_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A self-deleting cron job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredJob {
    /// File name in the scheduler directory
    pub name: String,
    /// Five-field cron schedule
    pub schedule: String,
    /// Shell command to run
    pub command: String,
}

impl DeferredJob {
    /// Create a job
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            command: command.into(),
        }
    }

    /// Where the job is written
    pub fn path(&self, config: &ToolsConfig) -> PathBuf {
        config.paths.cron_dir.join(&self.name)
    }

    /// The cron line, which removes the job file once the command succeeded
    pub fn render(&self, config: &ToolsConfig) -> String {
        format!(
            "{} root PATH={} {} && rm -f {}\n",
            self.schedule,
            CRON_PATH,
            self.command,
            self.path(config).display()
        )
    }

    /// Step writing the job
    pub fn step(&self, config: &ToolsConfig) -> Step {
        Step::WriteFile {
            path: self.path(config),
            contents: self.render(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_matches_cron_format() {
        let config = ToolsConfig::default();
        let job = DeferredJob::new(
            "yunohost-upgrade",
            "00 * * * *",
            "apt-get install ssowat python -y",
        );
        assert_eq!(
            job.render(&config),
            "00 * * * * root PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin \
             apt-get install ssowat python -y && rm -f /etc/cron.d/yunohost-upgrade\n"
        );
    }
}
