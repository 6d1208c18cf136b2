//! Interactive editing of the config file.
//!
//! Each setting is prompted for in turn, showing the current value. An empty
//! answer keeps it.

use crate::config::RawConfig;
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Run the configure command against stdin/stdout
pub fn run(config_path: &Path) -> Result<()> {
    let mut config = if config_path.exists() {
        RawConfig::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        RawConfig::default()
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    edit(&mut config, &mut stdin.lock(), &mut stdout.lock())?;

    config
        .save(config_path)
        .with_context(|| format!("Failed to save config {}", config_path.display()))?;
    println!("Configuration saved to {}", config_path.display());
    Ok(())
}

/// Walk through every setting, updating `config` from `input`
pub fn edit<R: BufRead, W: Write>(
    config: &mut RawConfig,
    input: &mut R,
    output: &mut W,
) -> io::Result<()> {
    let mut prompter = Prompter { input, output };

    let backup = &mut config.backup;
    prompter.optional("Base folder to back up", &mut backup.base_folder)?;
    prompter.text("Names to exclude (comma-separated)", &mut backup.exclude)?;
    prompter.text("Name prefixes to exclude", &mut backup.exclude_prefix)?;
    prompter.text("Name suffixes to exclude", &mut backup.exclude_suffix)?;
    prompter.optional("Backup file name, without extension", &mut backup.backup_filename)?;
    prompter.optional("Archive type (zip or tar)", &mut backup.backup_type)?;
    prompter.text("Maximum file size (e.g. 500M)", &mut backup.max_size)?;
    prompter.flag("Follow symbolic links", &mut backup.follow_symlinks)?;

    let remote = &mut config.remote;
    prompter.flag("Enable remote backup", &mut remote.enable)?;
    if remote.enable {
        prompter.text("Remote server", &mut remote.server)?;
        prompter.text("Remote user", &mut remote.user)?;
        prompter.text("Remote path", &mut remote.path)?;
        prompter.text("rsync options", &mut remote.rsync_options)?;
        prompter.secret("Remote password", &mut remote.password)?;
        prompter.seconds("Transfer timeout in seconds, 0 for none", &mut remote.timeout)?;
    }

    Ok(())
}

struct Prompter<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Prompter<'_, R, W> {
    /// Returns the trimmed answer, `None` when it was empty or input ended
    fn ask(&mut self, label: &str, current: &str) -> io::Result<Option<String>> {
        if current.is_empty() {
            write!(self.output, "{}: ", label)?;
        } else {
            write!(self.output, "{} [{}]: ", label, current)?;
        }
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }

    fn text(&mut self, label: &str, value: &mut String) -> io::Result<()> {
        if let Some(answer) = self.ask(label, value)? {
            *value = answer;
        }
        Ok(())
    }

    fn optional(&mut self, label: &str, value: &mut Option<String>) -> io::Result<()> {
        let current = value.clone().unwrap_or_default();
        if let Some(answer) = self.ask(label, &current)? {
            *value = Some(answer);
        }
        Ok(())
    }

    fn secret(&mut self, label: &str, value: &mut String) -> io::Result<()> {
        let shown = if value.is_empty() { "" } else { "********" };
        if let Some(answer) = self.ask(label, shown)? {
            *value = answer;
        }
        Ok(())
    }

    fn seconds(&mut self, label: &str, value: &mut u64) -> io::Result<()> {
        loop {
            match self.ask(label, &value.to_string())? {
                None => return Ok(()),
                Some(answer) => match answer.parse() {
                    Ok(seconds) => {
                        *value = seconds;
                        return Ok(());
                    }
                    Err(_) => writeln!(self.output, "Please enter a whole number of seconds")?,
                },
            }
        }
    }

    fn flag(&mut self, label: &str, value: &mut bool) -> io::Result<()> {
        let current = if *value { "yes" } else { "no" };
        loop {
            match self.ask(&format!("{} (yes/no)", label), current)? {
                None => return Ok(()),
                Some(answer) => match answer.to_lowercase().as_str() {
                    "y" | "yes" | "true" => {
                        *value = true;
                        return Ok(());
                    }
                    "n" | "no" | "false" => {
                        *value = false;
                        return Ok(());
                    }
                    _ => writeln!(self.output, "Please answer yes or no")?,
                },
            }
        }
    }
}
