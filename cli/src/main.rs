//! `trustauthority-cli`: external front-end over the Trust Authority client
//! crates. This binary is the single place an `anyhow::Error` is acceptable
//! in the workspace — every crate it calls into still returns typed errors.

mod decrypt;
mod flags;
mod keypair;

use anyhow::{anyhow, bail, Context, Result};
use flags::Flags;
use std::io::{Read, Write};
use std::process::ExitCode;
use ta_core::{Handle, PcrSelection, TrustAuthorityConfig, VerifierNonce};
use ta_evidence::adapters::{CompositeEvidence, TpmAdapter};
use ta_evidence::builder::{EvidenceBuilder, TokenSigningAlg};
use ta_tpm::{TpmDevice, TpmKind};

const DEFAULT_EK_HANDLE: u32 = 0x8100_0F00;
const DEFAULT_AK_HANDLE: u32 = 0x8100_0F01;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        print_usage();
        return ExitCode::FAILURE;
    };
    let rest = &args[1..];
    let flags = Flags::parse(rest);

    if !flags.flag("json-logs") {
        ta_core::logging::init();
    } else {
        ta_core::logging::init_json();
    }

    let result = match command.as_str() {
        "create-key-pair" => cmd_create_key_pair(&flags),
        "decrypt" => cmd_decrypt(&flags),
        "quote" => cmd_quote(&flags),
        "token" => cmd_token(&flags),
        "report" => cmd_report(&flags),
        "verify" => cmd_verify(&flags),
        "version" => cmd_version(&flags),
        other => {
            print_usage();
            Err(anyhow!("unknown command: {other}"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("trustauthority-cli <command> [flags]");
    eprintln!("Commands: create-key-pair | decrypt | quote | token | report | verify | version");
}

fn decode_b64(s: &str) -> Result<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .context("invalid base64")
}

fn parse_handle(flags: &Flags, name: &str, default: u32) -> Result<Handle> {
    match flags.get(name) {
        Some(s) => {
            let raw = s
                .strip_prefix("0x")
                .map(|hex| u32::from_str_radix(hex, 16))
                .unwrap_or_else(|| s.parse::<u32>());
            Ok(Handle::new(raw.with_context(|| format!("invalid --{name}"))?))
        }
        None => Ok(Handle::new(default)),
    }
}

fn parse_pcr_selection(flags: &Flags) -> Result<Option<PcrSelection>> {
    match flags.get("pcr-selection") {
        Some(s) => Ok(Some(PcrSelection::parse(s)?)),
        None => Ok(None),
    }
}

fn parse_policy_ids(flags: &Flags) -> Result<Option<Vec<uuid::Uuid>>> {
    match flags.get("policy-ids") {
        Some(csv) => {
            let ids: Result<Vec<uuid::Uuid>> = csv
                .split(',')
                .map(|s| uuid::Uuid::parse_str(s.trim()).context("invalid --policy-ids UUID"))
                .collect();
            Ok(Some(ids?))
        }
        None => Ok(None),
    }
}

fn parse_token_signing_alg(flags: &Flags) -> Result<Option<TokenSigningAlg>> {
    match flags.get("token-signing-alg") {
        Some("RS256") => Ok(Some(TokenSigningAlg::Rs256)),
        Some("PS384") => Ok(Some(TokenSigningAlg::Ps384)),
        Some(other) => bail!("--token-signing-alg must be RS256 or PS384, got '{other}'"),
        None => Ok(None),
    }
}

fn load_config(flags: &Flags) -> Result<TrustAuthorityConfig> {
    let path = flags.require("config")?;
    Ok(TrustAuthorityConfig::from_file(path)?)
}

/// Resolve user-data bytes: `--user-data` wins; otherwise `--pub-path`'s PEM
/// body (DER-decoded) is used; otherwise `None`.
fn resolve_user_data(flags: &Flags) -> Result<Option<Vec<u8>>> {
    if let Some(encoded) = flags.get("user-data") {
        return Ok(Some(decode_b64(encoded)?));
    }
    if let Some(path) = flags.get("pub-path") {
        let bytes = ta_core::read_file(path)?;
        let parsed = pem::parse(&bytes).context("parsing --pub-path as PEM")?;
        return Ok(Some(parsed.contents().to_vec()));
    }
    Ok(None)
}

/// Resolve the verifier nonce: `--nonce` supplies raw challenge bytes
/// wrapped as a bare `VerifierNonce` (no ITA-issued `iat`/`signature`);
/// absent, the CLI fetches a fully-signed nonce from ITA.
fn resolve_nonce(flags: &Flags, client: Option<&ta_connector::ItaClient>) -> Result<Option<VerifierNonce>> {
    if let Some(encoded) = flags.get("nonce") {
        let val = decode_b64(encoded)?;
        return Ok(Some(VerifierNonce {
            val,
            iat: Vec::new(),
            signature: Vec::new(),
        }));
    }
    match client {
        Some(c) => Ok(Some(c.get_nonce()?)),
        None => Ok(None),
    }
}

fn open_simulator_with_keys(ek: Handle, ak: Handle) -> Result<TpmDevice> {
    let mut device = TpmDevice::open(TpmKind::Simulator, Vec::new())?;
    device.create_ek(ek)?;
    device.create_ak(ak, ek)?;
    Ok(device)
}

fn cmd_create_key_pair(flags: &Flags) -> Result<()> {
    let pub_path = flags.get("pub-path").unwrap_or("publickey.pem");
    let key_path = flags.get("key-path").unwrap_or("privatekey.pem");
    keypair::create_key_pair(pub_path, key_path)?;
    println!("wrote {pub_path} and {key_path}");
    Ok(())
}

fn cmd_decrypt(flags: &Flags) -> Result<()> {
    let key_path = flags.get("key-path").unwrap_or("privatekey.pem");
    let mut ciphertext_b64 = String::new();
    std::io::stdin()
        .read_to_string(&mut ciphertext_b64)
        .context("reading ciphertext from stdin")?;
    let plaintext = decrypt::decrypt(key_path, &ciphertext_b64)?;
    std::io::stdout().write_all(&plaintext)?;
    Ok(())
}

fn cmd_quote(flags: &Flags) -> Result<()> {
    let ek = parse_handle(flags, "ek-handle", DEFAULT_EK_HANDLE)?;
    let ak = parse_handle(flags, "ak-handle", DEFAULT_AK_HANDLE)?;
    let selection = parse_pcr_selection(flags)?;
    let nonce = match flags.get("nonce") {
        Some(s) => decode_b64(s)?,
        None => Vec::new(),
    };

    let mut device = open_simulator_with_keys(ek, ak)?;
    let quote = device.get_quote(ak, &nonce, selection.as_ref())?;

    let output = serde_json::json!({
        "signed": ta_core::b64::encode(&quote.signed),
        "signature": ta_core::b64::encode(&quote.signature),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_token(flags: &Flags) -> Result<()> {
    let config = load_config(flags)?;
    let client = ta_connector::ItaClient::new(config);

    let user_data = resolve_user_data(flags)?;
    let nonce = resolve_nonce(flags, Some(&client))?;
    let policy_ids = parse_policy_ids(flags)?;
    let token_signing_alg = parse_token_signing_alg(flags)?;
    let policy_must_match = flags.get("policy-must-match").map(|_| flags.flag("policy-must-match"));

    let ek = parse_handle(flags, "ek-handle", DEFAULT_EK_HANDLE)?;
    let ak = parse_handle(flags, "ak-handle", DEFAULT_AK_HANDLE)?;
    let selection = parse_pcr_selection(flags)?;
    let mut device = open_simulator_with_keys(ek, ak)?;

    let mut adapter = TpmAdapter::new(&mut device, ak);
    if let Some(selection) = selection {
        adapter = adapter.with_pcr_selection(selection);
    }

    let mut builder = EvidenceBuilder::new().with_adapter(Box::new(adapter));
    if let Some(nonce) = nonce {
        builder = builder.with_verifier_nonce(nonce);
    }
    if let Some(data) = user_data {
        builder = builder.with_user_data(data);
    }
    if let Some(ids) = policy_ids {
        builder = builder.with_policy_ids(ids);
    }
    if let Some(alg) = token_signing_alg {
        builder = builder.with_token_signing_alg(alg);
    }
    if let Some(flag) = policy_must_match {
        builder = builder.with_policy_must_match(flag);
    }

    let evidence = builder.build()?;
    let cloud_provider = flags.get("cloud-provider");
    let token = client.attest_v2(&evidence, cloud_provider)?;
    println!("{token}");
    Ok(())
}

fn cmd_report(flags: &Flags) -> Result<()> {
    let config = load_config(flags).ok();
    let client = config.map(ta_connector::ItaClient::new);

    let user_data = resolve_user_data(flags)?;
    let nonce = resolve_nonce(flags, client.as_ref())?;

    let ek = parse_handle(flags, "ek-handle", DEFAULT_EK_HANDLE)?;
    let ak = parse_handle(flags, "ak-handle", DEFAULT_AK_HANDLE)?;
    let selection = parse_pcr_selection(flags)?;
    let mut device = open_simulator_with_keys(ek, ak)?;

    let mut adapter = TpmAdapter::new(&mut device, ak);
    if let Some(selection) = selection {
        adapter = adapter.with_pcr_selection(selection);
    }

    let evidence = adapter.get_evidence(nonce.as_ref(), user_data.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&evidence)?);
    Ok(())
}

fn cmd_verify(flags: &Flags) -> Result<()> {
    let config = load_config(flags)?;
    let token = flags.require("token")?.to_string();

    let client = ta_connector::ItaClient::new(config);
    let jwks = client.get_jwks()?;
    let http_client = ta_verifier::crl::new_http_client()?;

    let verified = ta_verifier::verify_token::<serde_json::Value>(&token, &jwks, &http_client)?;
    println!("{}", serde_json::to_string_pretty(&verified.claims)?);
    Ok(())
}

fn cmd_version(flags: &Flags) -> Result<()> {
    if flags.flag("json") {
        let output = serde_json::json!({ "version": env!("CARGO_PKG_VERSION") });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("trustauthority-cli {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(())
}
