//! IPS patch command implementations

use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use ips_patch::{Error as IpsError, PatchFile};

use crate::utils::{add_table_row, create_table, format_bytes, format_hex, format_offset};

/// Number of data bytes shown per record in tables
const PREVIEW_BYTES: usize = 8;

#[derive(Subcommand)]
pub enum IpsCommands {
    /// Display information about an IPS patch
    Info {
        /// Path to the IPS patch
        patch: PathBuf,

        /// Print the decoded patch as JSON
        #[arg(long)]
        json: bool,

        /// Maximum number of records to list
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Decode an IPS patch and validate every record
    Validate {
        /// Path to the IPS patch
        patch: PathBuf,
    },

    /// Apply an IPS patch to a file
    Apply {
        /// Path to the IPS patch
        patch: PathBuf,

        /// File to patch
        target: PathBuf,

        /// Write the patched result here instead of modifying the target
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Apply even if the target already holds the patched content
        #[arg(long)]
        force: bool,

        /// Verify the result after applying
        #[arg(long)]
        verify: bool,
    },

    /// Check whether a file already holds the content of an IPS patch
    Check {
        /// Path to the IPS patch
        patch: PathBuf,

        /// File to check
        target: PathBuf,
    },

    /// Decode an IPS patch and write it back out in canonical form
    Rewrite {
        /// Path to the input IPS patch
        input: PathBuf,

        /// Path to write the rewritten patch
        output: PathBuf,

        /// Replace the truncation length (0 removes it)
        #[arg(long, value_name = "BYTES")]
        truncate: Option<u16>,
    },
}

pub fn execute(command: IpsCommands, verbose: bool) -> Result<()> {
    match command {
        IpsCommands::Info { patch, json, limit } => execute_info(&patch, json, limit),
        IpsCommands::Validate { patch } => execute_validate(&patch),
        IpsCommands::Apply {
            patch,
            target,
            output,
            force,
            verify,
        } => execute_apply(&patch, &target, output.as_deref(), force, verify, verbose),
        IpsCommands::Check { patch, target } => execute_check(&patch, &target),
        IpsCommands::Rewrite {
            input,
            output,
            truncate,
        } => execute_rewrite(&input, &output, truncate, verbose),
    }
}

fn open_patch(path: &Path) -> Result<PatchFile> {
    PatchFile::open(path)
        .with_context(|| format!("Failed to parse IPS patch: {}", path.display()))
}

/// Whether two paths name the same existing file
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn execute_info(path: &Path, json: bool, limit: Option<usize>) -> Result<()> {
    use console::style;

    let patch = open_patch(path)?;

    if json {
        let output =
            serde_json::to_string_pretty(&patch).context("Failed to serialize patch to JSON")?;
        println!("{output}");
        return Ok(());
    }

    let file_size = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .len();
    let payload: u64 = patch.iter().map(|r| r.size() as u64).sum();

    println!("IPS Patch Information");
    println!("=====================");
    println!();
    println!("File: {}", style(path.display()).cyan());
    println!("Size: {}", format_bytes(file_size));
    println!(
        "Records: {} ({} literal, {} RLE)",
        style(patch.len()).yellow(),
        patch.len() - patch.rle_count(),
        patch.rle_count()
    );
    println!("Payload: {}", format_bytes(payload));
    println!(
        "Target length required: {}",
        format_bytes(patch.required_len())
    );
    match patch.truncate() {
        Some(len) => println!("Truncate to: {} ({len} bytes)", format_bytes(len as u64)),
        None => println!("Truncate to: {}", style("none").dim()),
    }

    if patch.is_empty() {
        return Ok(());
    }

    let shown = limit.unwrap_or(usize::MAX).min(patch.len());

    println!();
    let mut table = create_table(vec!["#", "Offset", "Kind", "Size", "Data"]);
    for (index, record) in patch.iter().enumerate().take(shown) {
        let (kind, data) = if record.is_rle() {
            ("RLE", format!("{} x {}", format_hex(record.data(), 1), record.size()))
        } else {
            ("Literal", format_hex(record.data(), PREVIEW_BYTES))
        };
        add_table_row(
            &mut table,
            vec![
                index.to_string(),
                record.offset().to_string(),
                kind.to_string(),
                record.size().to_string(),
                data,
            ],
        );
    }
    table.printstd();

    if shown < patch.len() {
        println!("... and {} more records", patch.len() - shown);
    }

    Ok(())
}

fn execute_validate(path: &Path) -> Result<()> {
    use console::style;

    let patch = open_patch(path)?;

    match patch.validate() {
        Ok(()) => {
            println!(
                "✓ IPS patch '{}' is valid ({} records)",
                style(path.display()).cyan(),
                style(patch.len()).yellow()
            );
        }
        Err(err) => {
            anyhow::bail!("Validation failed: {}", err);
        }
    }

    Ok(())
}

fn execute_apply(
    patch_path: &Path,
    target: &Path,
    output: Option<&Path>,
    force: bool,
    verify: bool,
    verbose: bool,
) -> Result<()> {
    use console::style;

    let mut patch = open_patch(patch_path)?;
    patch.set_verbose(verbose);

    let destination = match output {
        Some(output) if same_file(target, output) => {
            log::debug!("Output is the target itself, patching in place");
            target
        }
        Some(output) => {
            fs::copy(target, output).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    target.display(),
                    output.display()
                )
            })?;
            output
        }
        None => target,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(destination)
        .with_context(|| format!("Failed to open file: {}", destination.display()))?;

    if !force
        && patch
            .is_applied(&mut file)
            .with_context(|| format!("Failed to read file: {}", destination.display()))?
    {
        println!(
            "Patch already applied to '{}', skipping (use --force to apply anyway)",
            style(destination.display()).cyan()
        );
        return Ok(());
    }

    let current_len = file
        .metadata()
        .with_context(|| format!("Failed to read metadata: {}", destination.display()))?
        .len();
    if patch.required_len() > current_len {
        log::info!(
            "Target grows from {} to at least {} bytes",
            current_len,
            patch.required_len()
        );
    }

    patch
        .apply(&mut file)
        .with_context(|| format!("Failed to apply patch to {}", destination.display()))?;

    if verify {
        patch
            .check(&mut file)
            .context("Verification after applying failed")?;
    }

    println!(
        "✓ Applied {} records to '{}'",
        style(patch.len()).yellow(),
        style(destination.display()).cyan()
    );

    Ok(())
}

fn execute_check(patch_path: &Path, target: &Path) -> Result<()> {
    use console::style;

    let patch = open_patch(patch_path)?;
    let mut file =
        File::open(target).with_context(|| format!("Failed to open file: {}", target.display()))?;

    match patch.check(&mut file) {
        Ok(()) => {
            println!(
                "✓ '{}' matches all {} records",
                style(target.display()).cyan(),
                style(patch.len()).yellow()
            );
            Ok(())
        }
        Err(IpsError::ContentMismatch { index, offset }) => {
            let record = &patch.records()[index];
            anyhow::bail!(
                "Record {} ({}) does not match at {}: expected [{}]",
                index,
                record,
                format_offset(offset as u64),
                format_hex(&record.expected_bytes(), PREVIEW_BYTES)
            )
        }
        Err(err) => Err(err).with_context(|| format!("Failed to check {}", target.display())),
    }
}

fn execute_rewrite(input: &Path, output: &Path, truncate: Option<u16>, verbose: bool) -> Result<()> {
    use console::style;

    let mut patch = open_patch(input)?;
    patch.set_verbose(verbose);
    if let Some(len) = truncate {
        patch.set_truncate(len);
    }

    let mut file = File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    patch
        .write(&mut file)
        .with_context(|| format!("Failed to write IPS patch: {}", output.display()))?;

    println!(
        "✓ Wrote {} records ({}) to '{}'",
        style(patch.len()).yellow(),
        format_bytes(patch.encoded_len() as u64),
        style(output.display()).cyan()
    );

    Ok(())
}
