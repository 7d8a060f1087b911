use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::Parser;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use uuid::Uuid;

/// Sign an access token the request gate will accept.
///
/// Issuance is not the gate's job; this tool exists for local development and
/// manual testing:
/// - HS256 with a shared secret (matches `ACCESS_JWT_HMAC_SECRET`), or
/// - EdDSA with an Ed25519 private key (pairs with `ACCESS_JWT_PUBLIC_KEY_PEM`)
#[derive(Parser, Debug)]
#[command(name = "token-gen", version, about)]
struct Args {
    /// Subject (`sub`), the principal id ownership checks compare against
    #[arg(long)]
    sub: String,

    /// Role to grant; repeat for several (e.g. --role USER --role ADMIN)
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    ttl: u64,

    /// Delay before the token becomes valid (`nbf`), in seconds
    #[arg(long)]
    not_before: Option<u64>,

    #[arg(long)]
    iss: Option<String>,

    #[arg(long)]
    aud: Option<String>,

    /// Shared HS256 secret
    #[arg(long, conflicts_with = "private_pem")]
    hmac_secret: Option<String>,

    /// Path to an Ed25519 private key in PEM (PKCS#8)
    #[arg(long, value_name = "FILE")]
    private_pem: Option<PathBuf>,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<u64>,

    /// Print only the token (no extra lines)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn now_unix() -> Result<u64, Box<dyn std::error::Error>> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (header, key) = match (&args.hmac_secret, &args.private_pem) {
        (Some(secret), None) => (
            Header::new(Algorithm::HS256),
            EncodingKey::from_secret(secret.as_bytes()),
        ),
        (None, Some(path)) => {
            let pem = fs::read(path)?;
            (
                Header::new(Algorithm::EdDSA),
                EncodingKey::from_ed_pem(&pem)?,
            )
        }
        _ => return Err("pass exactly one of --hmac-secret or --private-pem".into()),
    };

    let iat = match args.iat {
        Some(iat) => iat,
        None => now_unix()?,
    };
    let exp = iat + args.ttl;
    let jti = Uuid::new_v4().to_string();

    let mut claims = serde_json::Map::new();
    claims.insert("sub".to_string(), args.sub.clone().into());
    claims.insert("roles".to_string(), args.roles.clone().into());
    claims.insert("iat".to_string(), iat.into());
    claims.insert("exp".to_string(), exp.into());
    claims.insert("jti".to_string(), jti.clone().into());

    if let Some(delay) = args.not_before {
        claims.insert("nbf".to_string(), (iat + delay).into());
    }
    if let Some(iss) = args.iss.clone() {
        claims.insert("iss".to_string(), iss.into());
    }
    if let Some(aud) = args.aud.clone() {
        claims.insert("aud".to_string(), aud.into());
    }

    let token = jsonwebtoken::encode(&header, &serde_json::Value::Object(claims), &key)?;

    if args.quiet {
        println!("{}", token);
        return Ok(());
    }

    println!("token: {}", token);
    println!("sub: {}", args.sub);
    println!("roles: {}", args.roles.join(","));
    println!("iat: {}", iat);
    println!("exp: {}", exp);
    println!("jti: {}", jti);

    Ok(())
}
