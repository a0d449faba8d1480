//! Command-line front end for inspecting and converting update containers.
//!
//! The interactive updater GUI and the USB transport are separate programs;
//! this tool covers the offline half of the workflow: checking a downloaded
//! `update.dat`, extracting a flashable image from it, and re-encrypting an
//! image for write-back.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use tl866_updater::device::DeviceVersion;
use tl866_updater::firmware::Firmware;
use tl866_updater::update::{UpdateContainer, Variant};
use tl866_updater::FLASH_SIZE;

#[derive(Parser)]
#[command(about = "Inspect and convert TL866 update containers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header and per-variant details of an update container
    Info {
        /// Path to the update.dat file
        update: PathBuf,
    },

    /// Run the full validation (magic, CRCs, signatures)
    Verify {
        /// Path to the update.dat file
        update: PathBuf,
    },

    /// Decrypt one firmware variant into a flash image file
    Extract {
        /// Path to the update.dat file
        update: PathBuf,

        /// Where to write the decrypted image
        output: PathBuf,

        /// Which firmware variant to extract (A or CS)
        #[clap(long, default_value = "A")]
        variant: Variant,
    },

    /// Re-encrypt a flash image for writing back to a device
    Encrypt {
        /// Path to the update.dat file carrying the cipher material
        update: PathBuf,

        /// The flash image to encrypt
        image: PathBuf,

        /// Where to write the encrypted blob
        output: PathBuf,

        /// Which device version's cipher material to use (A or CS)
        #[clap(long, default_value = "A")]
        key: DeviceVersion,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Info { update } => info(&update),
        Command::Verify { update } => verify(&update),
        Command::Extract {
            update,
            output,
            variant,
        } => extract(&update, &output, variant),
        Command::Encrypt {
            update,
            image,
            output,
            key,
        } => encrypt(&update, &image, &output, key),
    }
}

fn info(update: &PathBuf) -> anyhow::Result<()> {
    let container = UpdateContainer::open(update).context("reading update container")?;

    println!("magic:            {}", if container.magic_ok() { "ok" } else { "BAD" });
    println!("firmware version: {:#04x}", container.version());
    for variant in Variant::ALL {
        let record = container.variant(variant);
        println!("{variant}:");
        println!("  stored CRC32:   {:#010x}", record.crc32);
        println!("  erase mode:     {:#04x}", record.erase);
        println!("  cipher index:   {:#010x}", record.index);
    }

    Ok(())
}

fn verify(update: &PathBuf) -> anyhow::Result<()> {
    let firmware = Firmware::open(update).context("update container failed validation")?;
    println!(
        "container is valid (firmware version {:#04x})",
        firmware.version()
    );
    Ok(())
}

fn extract(update: &PathBuf, output: &PathBuf, variant: Variant) -> anyhow::Result<()> {
    let firmware = Firmware::open(update).context("update container failed validation")?;
    let image = firmware.decrypt_firmware(variant);
    fs::write(output, &image).with_context(|| format!("writing {}", output.display()))?;
    println!("extracted {variant} image to {}", output.display());
    Ok(())
}

fn encrypt(
    update: &PathBuf,
    image: &PathBuf,
    output: &PathBuf,
    key: DeviceVersion,
) -> anyhow::Result<()> {
    let firmware = Firmware::open(update).context("update container failed validation")?;

    let image = fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    anyhow::ensure!(
        image.len() == FLASH_SIZE,
        "flash image is {} bytes, expected {FLASH_SIZE}",
        image.len()
    );

    let blob = firmware.encrypt_firmware(&image, key);
    fs::write(output, &blob).with_context(|| format!("writing {}", output.display()))?;
    println!("encrypted image written to {}", output.display());
    Ok(())
}
