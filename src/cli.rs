//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::DEFAULT_CACHE_CAPACITY;
use crate::db::Database;
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, KeyRing, REFRESH_TOKEN_DURATION_SECS, SigningKey, TokenSettings,
};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound on the access token lifetime: one day
pub const MAX_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;

/// Upper bound on the refresh token lifetime: 400 days, the longest cookie
/// lifetime browsers honor
pub const MAX_REFRESH_TTL_SECS: u64 = 400 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Algorithm of PEM private key files.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyType {
    /// EC P-256 key in PKCS#8 form
    #[default]
    Es256,
    /// RSA key
    Rs256,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "latchkey", about = "JWT session backend with silent token refresh")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "latchkey.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Key id stamped on newly signed tokens
    #[arg(long, env = "JWT_KEY_ID", default_value = "primary")]
    pub jwt_key_id: String,

    /// Retired keys still accepted for verification, as `kid:secret` pairs separated by commas
    #[arg(long, env = "JWT_PREVIOUS_KEYS", hide_env_values = true)]
    pub jwt_previous_keys: Option<String>,

    /// PEM private key file for asymmetric signing, used instead of JWT_SECRET.
    /// Its public key is published at /api/auth/jwks
    #[arg(long, env = "JWT_PRIVATE_KEY_FILE")]
    pub jwt_private_key_file: Option<String>,

    /// Algorithm of the private key files
    #[arg(long, value_enum, default_value = "es256")]
    pub jwt_key_type: KeyType,

    /// Retired private key files still accepted for verification,
    /// as `kid:path` pairs separated by commas
    #[arg(long, env = "JWT_PREVIOUS_KEY_FILES")]
    pub jwt_previous_key_files: Option<String>,

    /// Token issuer claim
    #[arg(long, env = "JWT_ISSUER", default_value = "latchkey")]
    pub issuer: String,

    /// Token audience claim
    #[arg(long, env = "JWT_AUDIENCE", default_value = "latchkey-api")]
    pub audience: String,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TTL_SECS)
    )]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds, longer than the access token lifetime
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_TTL_SECS)
    )]
    pub refresh_ttl: u64,

    /// Maximum number of cached identities (0 = unbounded)
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub identity_cache_capacity: usize,

    /// Create an identity with this email on startup and print its subject id
    #[arg(long)]
    pub create_identity: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse `kid:value,kid:value` into key id / value pairs.
fn parse_key_pairs(value: &str, what: &str) -> Result<Vec<(String, String)>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (kid, value) = entry
                .split_once(':')
                .ok_or_else(|| format!("Previous key must be written as kid:{}", what))?;
            let (kid, value) = (kid.trim(), value.trim());
            if kid.is_empty() {
                return Err("Previous key has an empty key id".to_string());
            }
            Ok((kid.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse `kid:secret,kid:secret` into key id / secret pairs.
pub fn parse_previous_keys(value: &str) -> Result<Vec<(String, String)>, String> {
    let pairs = parse_key_pairs(value, "secret")?;
    if let Some((kid, _)) = pairs
        .iter()
        .find(|(_, secret)| secret.len() < MIN_JWT_SECRET_LENGTH)
    {
        return Err(format!(
            "Previous key {} is shorter than {} characters",
            kid, MIN_JWT_SECRET_LENGTH
        ));
    }
    Ok(pairs)
}

/// Build the key ring from the current secret and any previous keys.
/// Returns None and logs an error if a previous key is invalid.
pub fn build_key_ring(
    key_id: &str,
    secret: &str,
    previous_keys: Option<&str>,
) -> Option<KeyRing> {
    let mut keys = KeyRing::new(SigningKey::from_secret(key_id, secret.as_bytes()));

    if let Some(previous_keys) = previous_keys {
        let previous = match parse_previous_keys(previous_keys) {
            Ok(previous) => previous,
            Err(e) => {
                error!(error = %e, "Invalid JWT_PREVIOUS_KEYS");
                return None;
            }
        };
        for (kid, secret) in previous {
            keys = keys.with_previous(SigningKey::from_secret(kid, secret.as_bytes()));
        }
    }

    info!(kids = ?keys.kids(), current = %key_id, "Loaded signing keys");
    Some(keys)
}

/// Read a PEM private key file of the given type.
pub fn load_signing_key_file(
    kid: &str,
    path: &str,
    key_type: KeyType,
) -> Result<SigningKey, String> {
    let pem = std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    let key = match key_type {
        KeyType::Es256 => SigningKey::from_ec_pem(kid, &pem),
        KeyType::Rs256 => SigningKey::from_rsa_pem(kid, &pem),
    };
    key.map_err(|e| format!("Invalid private key in {}: {}", path, e))
}

/// Build the key ring from private key files.
/// Returns None and logs an error if any key cannot be loaded.
pub fn build_asymmetric_key_ring(
    key_id: &str,
    path: &str,
    key_type: KeyType,
    previous_key_files: Option<&str>,
) -> Option<KeyRing> {
    let mut keys = match load_signing_key_file(key_id, path, key_type) {
        Ok(key) => KeyRing::new(key),
        Err(e) => {
            error!(error = %e, "Invalid JWT_PRIVATE_KEY_FILE");
            return None;
        }
    };

    if let Some(previous_key_files) = previous_key_files {
        let loaded = parse_key_pairs(previous_key_files, "path").and_then(|pairs| {
            pairs
                .iter()
                .map(|(kid, path)| load_signing_key_file(kid, path, key_type))
                .collect::<Result<Vec<_>, _>>()
        });
        match loaded {
            Ok(previous) => {
                for key in previous {
                    keys = keys.with_previous(key);
                }
            }
            Err(e) => {
                error!(error = %e, "Invalid JWT_PREVIOUS_KEY_FILES");
                return None;
            }
        }
    }

    info!(
        kids = ?keys.kids(),
        current = %key_id,
        key_type = ?key_type,
        "Loaded signing keys"
    );
    Some(keys)
}

/// Load the key ring from private key files if configured, otherwise from
/// the shared secret. Returns None after logging if keys cannot be loaded.
pub fn load_key_ring(args: &Args) -> Option<KeyRing> {
    if let Some(path) = args.jwt_private_key_file.as_deref() {
        return build_asymmetric_key_ring(
            &args.jwt_key_id,
            path,
            args.jwt_key_type,
            args.jwt_previous_key_files.as_deref(),
        );
    }

    let secret = load_jwt_secret(args.jwt_secret_file.as_deref())?;
    build_key_ring(&args.jwt_key_id, &secret, args.jwt_previous_keys.as_deref())
}

/// Reject lifetimes where the access token would outlive the refresh token.
pub fn validate_token_lifetimes(args: &Args) -> Result<(), String> {
    if args.access_ttl >= args.refresh_ttl {
        return Err(format!(
            "Access token lifetime ({}s) must be shorter than refresh token lifetime ({}s)",
            args.access_ttl, args.refresh_ttl
        ));
    }
    Ok(())
}

/// Build the token settings from validated arguments.
pub fn token_settings(args: &Args) -> TokenSettings {
    TokenSettings {
        issuer: args.issuer.clone(),
        audience: args.audience.clone(),
        access_ttl_secs: args.access_ttl,
        refresh_ttl_secs: args.refresh_ttl,
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, keys: KeyRing) -> ServerConfig {
    ServerConfig {
        db,
        keys,
        tokens: token_settings(args),
        identity_cache_capacity: args.identity_cache_capacity,
    }
}

/// Handle the --create-identity flag: create the identity or show the existing one.
pub async fn handle_create_identity(db: &Database, email: &str) {
    match db.identities().get_by_email(email).await {
        Ok(Some(existing)) => {
            println!();
            println!("Identity already exists: {}", existing.email);
            println!("Subject: {}", existing.uuid);
            println!();
        }
        Ok(None) => match db.identities().create(email, serde_json::Map::new()).await {
            Ok(identity) => {
                println!();
                println!("Identity created: {}", identity.email);
                println!("Subject: {}", identity.uuid);
                println!();
            }
            Err(e) => {
                error!(error = %e, "Failed to create identity");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to check for existing identity");
            std::process::exit(1);
        }
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
