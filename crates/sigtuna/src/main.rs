#![forbid(unsafe_code)]

//! Sigtuna CLI — offline SAML 2.0 Response inspection and validation.

use clap::{Parser, Subcommand};
use sigtuna::{Response, Settings, ValidationOptions};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — SAML 2.0 Response validation for Service Providers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and validate a SAML Response
    Validate {
        /// Response file (raw XML or a base64 SAMLResponse payload)
        file: PathBuf,

        /// Settings JSON file
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// IdP certificate PEM file (overrides the settings file)
        #[arg(long)]
        idp_cert: Option<PathBuf>,

        /// SP entity ID
        #[arg(long)]
        sp_entity_id: Option<String>,

        /// Assertion Consumer Service URL
        #[arg(long)]
        acs_url: Option<String>,

        /// Expected IdP entity ID
        #[arg(long)]
        idp_entity_id: Option<String>,

        /// SP private key PEM file for decryption (repeatable, tried in
        /// order)
        #[arg(long = "sp-key")]
        sp_keys: Vec<PathBuf>,

        /// Allowed clock drift in seconds
        #[arg(long, default_value_t = 0.0)]
        clock_drift: f64,

        /// Print the extracted subject, attributes, and session data
        #[arg(short, long)]
        verbose: bool,
    },

    /// Decode a SAMLResponse payload and print the XML
    Decode {
        /// Payload file
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Decode { file } => {
            let payload = std::fs::read_to_string(file)?;
            println!("{}", sigtuna::decode_payload(&payload)?);
            Ok(0)
        }
        Commands::Validate {
            file,
            settings,
            idp_cert,
            sp_entity_id,
            acs_url,
            idp_entity_id,
            sp_keys,
            clock_drift,
            verbose,
        } => {
            let payload = std::fs::read_to_string(file)?;

            let mut settings: Settings = match settings {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => Settings::default(),
            };
            if let Some(path) = idp_cert {
                settings.idp_cert = Some(std::fs::read_to_string(path)?);
            }
            if let Some(value) = sp_entity_id {
                settings.sp_entity_id = value;
            }
            if let Some(value) = acs_url {
                settings.assertion_consumer_service_url = value;
            }
            if let Some(value) = idp_entity_id {
                settings.idp_entity_id = value;
            }
            for path in sp_keys {
                settings.sp_decryption_keys.push(std::fs::read_to_string(path)?);
            }

            let options = ValidationOptions {
                allowed_clock_drift: clock_drift,
                ..ValidationOptions::default()
            };

            let mut response = Response::new(&payload, &settings, options)?;
            if response.is_valid(true) {
                println!("valid");
                if verbose {
                    print_summary(&response);
                }
                Ok(0)
            } else {
                println!("INVALID");
                for error in response.errors() {
                    println!("  - {error}");
                }
                Ok(1)
            }
        }
    }
}

fn print_summary(response: &Response<'_>) {
    if let Some(name_id) = response.name_id() {
        println!("name_id: {name_id}");
    }
    if let Some(format) = response.name_id_format() {
        println!("name_id_format: {format}");
    }
    if let Some(index) = response.sessionindex() {
        println!("session_index: {index}");
    }
    if let Some(expires) = response.session_expires_at() {
        println!("session_expires_at: {expires}");
    }
    for issuer in response.issuers() {
        println!("issuer: {issuer}");
    }
    for (name, values) in response.attributes().iter() {
        let rendered: Vec<String> = values
            .iter()
            .map(|v| v.as_deref().unwrap_or("<nil>").to_owned())
            .collect();
        println!("attribute {name}: {}", rendered.join(", "));
    }
}
