use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use libuplink::frame::Encoder;
use libuplink::secrets::GlobalSecrets;
use libuplink::subscription::{gen_embeddable_subscription, gen_subscription};

mod secrets_header;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the secrets file for a deployment
    GenSecrets {
        /// Overwrite an existing secrets file
        #[arg(short, long)]
        force: bool,
        /// Path to the secrets file to be created
        secrets_file: PathBuf,
        /// Supported channels. Channel 0 (broadcast) is always valid
        #[arg(required = true)]
        channels: Vec<u32>,
    },
    /// Generate a subscription for a device
    GenSubscription {
        /// Overwrite an existing subscription file
        #[arg(short, long)]
        force: bool,
        /// Generate a subscription that can be placed in flash
        #[arg(long)]
        embeddable: bool,
        /// Path to the secrets file created by gen-secrets
        secrets_file: PathBuf,
        /// Subscription output
        subscription_file: PathBuf,
        /// Device ID of the update recipient
        #[arg(value_parser = parse_u32)]
        device_id: u32,
        /// Subscription start timestamp
        #[arg(value_parser = parse_u64)]
        start: u64,
        /// Subscription end timestamp
        #[arg(value_parser = parse_u64)]
        end: u64,
        /// Channel to subscribe to
        channel: u32,
    },
    /// Emit the C source with the keys a decoder build embeds
    GenSecretsHeader {
        /// Overwrite an existing header file
        #[arg(short, long)]
        force: bool,
        /// Path to the secrets file
        secrets_file: PathBuf,
        /// Path to the secrets C file to be created
        header_file: PathBuf,
        /// Device ID to derive the id key for
        #[arg(value_parser = parse_u32)]
        device_id: u32,
    },
    /// Encode a single frame into a broadcast packet
    Encode {
        /// Overwrite an existing packet file
        #[arg(short, long)]
        force: bool,
        /// Path to the secrets file
        secrets_file: PathBuf,
        /// Raw frame contents, at most 64 bytes
        frame_file: PathBuf,
        /// Packet output
        packet_file: PathBuf,
        /// Channel to broadcast on
        channel: u32,
        /// Timestamp of the frame
        #[arg(value_parser = parse_u64)]
        timestamp: u64,
    },
}

/// Accept decimal or 0x-prefixed hex.
fn parse_u32(n: &str) -> Result<u32, String> {
    let parsed = match n.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => n.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_u64(n: &str) -> Result<u64, String> {
    let parsed = match n.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => n.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

/// Create the output file, erroring if it exists unless `force` was given.
fn write_output(path: &Path, force: bool, bytes: &[u8]) {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options
        .open(path)
        .and_then(|mut file| file.write_all(bytes))
        .expect("could not write the output file");
}

fn read_secrets(path: &Path) -> GlobalSecrets {
    let bytes = fs::read(path).expect("could not read the secrets file");
    GlobalSecrets::deserialize(&bytes).expect("could not parse the secrets file")
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::GenSecrets {
            force,
            secrets_file,
            channels,
        } => {
            let secrets = GlobalSecrets::generate(&channels);
            write_output(&secrets_file, force, &secrets.serialize());
        }
        Command::GenSubscription {
            force,
            embeddable,
            secrets_file,
            subscription_file,
            device_id,
            start,
            end,
            channel,
        } => {
            let secrets = read_secrets(&secrets_file);

            if embeddable {
                let subscription = gen_embeddable_subscription(&secrets, start, end, channel)
                    .expect("could not generate the subscription");
                write_output(&subscription_file, force, &subscription);
            } else {
                let subscription = gen_subscription(&secrets, device_id, start, end, channel)
                    .expect("could not generate the subscription");
                write_output(&subscription_file, force, &subscription);
            }
        }
        Command::GenSecretsHeader {
            force,
            secrets_file,
            header_file,
            device_id,
        } => {
            let secrets = read_secrets(&secrets_file);
            let header = secrets_header::generate(&secrets, device_id);
            write_output(&header_file, force, header.as_bytes());
        }
        Command::Encode {
            force,
            secrets_file,
            frame_file,
            packet_file,
            channel,
            timestamp,
        } => {
            let secrets = read_secrets(&secrets_file);
            let frame = fs::read(&frame_file).expect("could not read the frame file");

            let packet = Encoder::new(secrets)
                .encode(channel, &frame, timestamp)
                .expect("could not encode the frame");
            write_output(&packet_file, force, &packet);
        }
    }
}
