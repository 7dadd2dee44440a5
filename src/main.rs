use anyhow::{bail, Context, Error};
use clap::Parser;
use clap_stdin::MaybeStdin;
use isomdl_proximity::cbor::{self, DiagnosticOptions};
use isomdl_proximity::nfc::apdu::{self, Apdu};
use isomdl_proximity::nfc::carrier::{CarrierRegistry, ConnectionMethod};
use isomdl_proximity::nfc::handover;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Print CBOR in diagnostic notation.
    Diag {
        /// Hex encoded CBOR.
        cbor: MaybeStdin<String>,
        /// Spread maps and arrays over several lines.
        #[arg(long)]
        pretty: bool,
        /// Print byte strings as their length only.
        #[arg(long)]
        bstr_length: bool,
        /// Decode embedded CBOR (tag 24).
        #[arg(long)]
        embedded: bool,
    },
    /// Print the fields of a command APDU.
    Apdu {
        /// Hex encoded command APDU.
        apdu: MaybeStdin<String>,
    },
    /// Summarise a Handover Select (or Request) NDEF message as JSON.
    Handover {
        /// Hex encoded NDEF message.
        message: MaybeStdin<String>,
        /// Parse a Handover Request instead.
        #[arg(long)]
        request: bool,
    },
}

fn main() -> Result<(), Error> {
    match Args::parse().action {
        Action::Diag {
            cbor,
            pretty,
            bstr_length,
            embedded,
        } => {
            let options = DiagnosticOptions {
                pretty,
                bstr_length_only: bstr_length,
                embedded_cbor: embedded,
            };
            println!("{}", diagnostics(&cbor, options)?);
        }
        Action::Apdu { apdu } => println!("{}", describe_apdu(&apdu)?),
        Action::Handover { message, request } => println!("{}", summarise_handover(&message, request)?),
    }
    Ok(())
}

fn decode_hex(input: &str) -> Result<Vec<u8>, Error> {
    let cleaned: String = input.split_whitespace().collect();
    hex::decode(cleaned).context("input is not hex")
}

fn diagnostics(input: &str, options: DiagnosticOptions) -> Result<String, Error> {
    let bytes = decode_hex(input)?;
    let item = cbor::decode(&bytes).context("could not decode CBOR")?;
    Ok(item.to_diagnostics(options))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApduSummary {
    cla: String,
    ins: String,
    p1: String,
    p2: String,
    command_type: String,
    data: String,
    le: usize,
    parsed: String,
}

fn describe_apdu(input: &str) -> Result<String, Error> {
    let bytes = decode_hex(input)?;
    if bytes.len() < 4 {
        bail!("a command APDU has at least four bytes");
    }
    let parsed = match Apdu::parse(&bytes) {
        Ok(command) => format!("{command:?}"),
        Err(response) => format!("rejected with {:04X}", response.status_word()),
    };
    let summary = ApduSummary {
        cla: format!("{:02X}", bytes[0]),
        ins: format!("{:02X}", bytes[1]),
        p1: format!("{:02X}", bytes[2]),
        p2: format!("{:02X}", bytes[3]),
        command_type: format!("{:?}", apdu::command_type(&bytes)),
        data: apdu::data(&bytes).map(hex::encode).unwrap_or_default(),
        le: apdu::le(&bytes),
        parsed,
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HandoverSummary {
    engagement: String,
    engagement_diagnostics: Option<String>,
    connection_methods: Vec<ConnectionMethod>,
}

fn summarise_handover(input: &str, request: bool) -> Result<String, Error> {
    let bytes = decode_hex(input)?;
    let registry = CarrierRegistry::default();
    let (engagement, connection_methods) = if request {
        let hr = handover::parse_handover_request(&bytes, &registry)
            .context("not a Handover Request")?;
        (hr.reader_engagement.unwrap_or_default(), hr.connection_methods)
    } else {
        let hs = handover::parse_handover_select(&bytes, &registry)
            .context("not a Handover Select")?;
        (hs.device_engagement, hs.connection_methods)
    };
    let engagement_diagnostics = cbor::decode(&engagement)
        .ok()
        .map(|item| item.to_diagnostics(DiagnosticOptions::default()));
    let summary = HandoverSummary {
        engagement: hex::encode(engagement),
        engagement_diagnostics,
        connection_methods,
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}
