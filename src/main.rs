mod analyser;
mod capture;
mod config;
mod error;
mod ui;

use analyser::core::{Outcome, RowInput, WindowReport};
use analyser::device::DeviceIdentifier;
use analyser::window::WindowAggregator;
use capture::rows::{ConvertOptions, RowStreamSummary};
use capture::DecoderKind;
use clap::{ArgAction, Parser, Subcommand};
use config::{DecoderConfig, DeviceConfig, WindowConfig};
use error::FlowError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use ui::output;

/// flowsniff turns packet captures into per-device traffic feature windows
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Display the run summary as formatted JSON
    #[arg(short = 'j', long, global = true, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a capture file into a ts,length,src,dst packet table
    Convert {
        /// pcap file to decode
        #[arg(short = 'f', long, value_parser)]
        file: PathBuf,

        /// Packet table to write
        #[arg(short = 'o', long, value_parser)]
        output: PathBuf,

        #[arg(short = 'd', long, value_enum, default_value_t = DecoderKind::Native)]
        decoder: DecoderKind,

        /// Append rows newer than the last one already in the output
        #[arg(short = 'r', long, action = ArgAction::SetTrue)]
        resume: bool,

        /// Stop after writing this many rows
        #[arg(short = 'n', long, value_parser)]
        max_rows: Option<u64>,
    },

    /// Compute feature windows from a packet table
    Windows {
        /// Packet table with ts,length,src,dst columns
        #[arg(short = 'i', long, value_parser)]
        input: PathBuf,

        /// Feature-window table to write
        #[arg(short = 'o', long, value_parser)]
        output: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Decode a capture file straight into feature windows
    Pipeline {
        /// pcap file to decode
        #[arg(short = 'f', long, value_parser)]
        file: PathBuf,

        /// Feature-window table to write
        #[arg(short = 'o', long, value_parser)]
        output: PathBuf,

        #[arg(short = 'd', long, value_enum, default_value_t = DecoderKind::Native)]
        decoder: DecoderKind,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(clap::Args, Debug)]
struct WindowArgs {
    /// Device address to compute features for, detected from traffic if omitted
    #[arg(long, value_parser)]
    device: Option<String>,

    /// Window size in seconds
    #[arg(short = 'w', long, default_value_t = 10.0, value_parser)]
    window: f64,

    /// Step between window starts in seconds
    #[arg(short = 's', long, default_value_t = 10.0, value_parser)]
    step: f64,
}

fn emit_json<T: Serialize>(data: &T) -> Result<(), FlowError> {
    println!("{}", output::data_as_json(data)?);
    Ok(())
}

fn report_conversion(summary: &RowStreamSummary, out_path: &Path, json: bool) -> Result<u8, FlowError> {
    if json {
        emit_json(summary)?;
    } else {
        output::print_conversion(summary, out_path);
    }
    Ok(0)
}

fn run_windows(input: RowInput, out_path: &Path, window: WindowArgs, json: bool) -> Result<u8, FlowError> {
    let identifier = DeviceIdentifier::new(DeviceConfig::default());
    let aggregator = WindowAggregator::new(WindowConfig::new(window.window, window.step)?);

    let report: WindowReport = analyser::core::analyse(input, window.device, &identifier, &aggregator)?;
    let outcome = report.outcome();
    match outcome {
        Outcome::Written => output::save_windows(&report.windows, out_path)?,
        Outcome::NoDeviceRows => log::warn!("No rows found involving device. Nothing written."),
        Outcome::NoWindows => log::warn!("No windows produced. Nothing written."),
    }

    if json {
        emit_json(&report)?;
    } else {
        output::print_windows(&report, out_path);
    }
    Ok(outcome.exit_code())
}

fn run(args: Args) -> Result<u8, FlowError> {
    let decoder_config = DecoderConfig::default();

    match args.command {
        Command::Convert {
            file,
            output,
            decoder,
            resume,
            max_rows,
        } => {
            let options = ConvertOptions {
                capture: file,
                output,
                decoder,
                resume,
                max_rows,
            };
            let summary = capture::rows::convert(&options, &decoder_config)?;
            report_conversion(&summary, &options.output, args.json)
        }
        Command::Windows { input, output, window } => {
            run_windows(RowInput::Table(&input), &output, window, args.json)
        }
        Command::Pipeline {
            file,
            output,
            decoder,
            window,
        } => {
            let input = RowInput::Capture {
                path: &file,
                decoder,
                config: &decoder_config,
            };
            run_windows(input, &output, window, args.json)
        }
    }
}

fn main() -> ExitCode {
    if let Err(err) = simple_logger::init_with_env() {
        eprintln!("Could not initialise logging: {err}");
    }

    let args = Args::parse();
    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(1)
        }
    }
}
