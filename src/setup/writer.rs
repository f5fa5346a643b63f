use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::ansi;
use super::prompts::confirm;

/// All values collected from the wizard prompts.
pub struct SetupValues {
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub groq_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,
    pub external_url: String,
    pub api_token: String,
}

/// Write config.toml and .env to ~/.voice-desk/.
/// Returns the config directory path.
pub fn write_config(values: &SetupValues) -> PathBuf {
    let config_dir = crate::config::config_dir();

    println!("\n  {} Writing configuration", ansi::bold(">>"));

    // Create directory if needed
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).expect("Failed to create ~/.voice-desk");
    }

    // Write config.toml
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("  {} config.toml already exists", ansi::yellow("!"));
        if !confirm("Overwrite?") {
            println!("  Skipping config.toml");
        } else {
            write_config_toml(&config_path, values);
        }
    } else {
        write_config_toml(&config_path, values);
    }

    // Write .env
    let env_path = config_dir.join(".env");
    if env_path.exists() {
        println!("  {} .env already exists", ansi::yellow("!"));
        if !confirm("Overwrite?") {
            println!("  Skipping .env");
        } else {
            write_env_file(&env_path, values);
        }
    } else {
        write_env_file(&env_path, values);
    }

    config_dir
}

fn write_config_toml(path: &Path, values: &SetupValues) {
    let content = format!(
        r#"[server]
host = "0.0.0.0"
port = 8443
# Secrets loaded from .env (SERVER_EXTERNAL_URL)
external_url = ""

[twilio]
# Secrets loaded from .env (TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN)
account_sid = ""
auth_token = ""
phone_number = "{phone}"
say_voice = "Polly.Joanna"

[openai]
# Secret loaded from .env (OPENAI_API_KEY)
api_key = ""
model = "gpt-4o-mini"
tts_voice = "alloy"

[anthropic]
# Secret loaded from .env (ANTHROPIC_API_KEY)
api_key = ""
model = "claude-3-5-haiku-latest"

[groq]
# Secret loaded from .env (GROQ_API_KEY)
api_key = ""
model = "llama-3.3-70b-versatile"

[elevenlabs]
# Secret loaded from .env (ELEVENLABS_API_KEY)
api_key = ""
voice_id = "{voice_id}"
model = "eleven_turbo_v2_5"

[routing]
voice_llm = "openai"
chat_llm = "groq"
llm_fallback = ["openai", "groq", "anthropic"]
tts = "elevenlabs"
tts_fallback = ["elevenlabs", "openai", "twilio"]
request_timeout_secs = 15
max_tokens = 300
temperature = 0.7

[agent]
default_id = "sales"

[session]
idle_timeout_secs = 900
sweep_interval_secs = 60

[cache]
flush_interval_secs = 600

[calls]
max_records = 500
history_window = 8

[api]
# Secret loaded from .env (VOICE_DESK_API_TOKEN)
token = ""
"#,
        phone = values.twilio_phone_number,
        voice_id = values.elevenlabs_voice_id,
    );

    fs::write(path, content).expect("Failed to write config.toml");
    println!("  {} {}", ansi::green("\u{2713}"), path.display());
}

fn write_env_file(path: &Path, values: &SetupValues) {
    let content = format!(
        r#"# Twilio
TWILIO_ACCOUNT_SID={twilio_sid}
TWILIO_AUTH_TOKEN={twilio_token}

# Language-model providers (empty = unavailable, router falls back)
OPENAI_API_KEY={openai_key}
ANTHROPIC_API_KEY={anthropic_key}
GROQ_API_KEY={groq_key}

# ElevenLabs (TTS)
ELEVENLABS_API_KEY={elevenlabs_key}

# API bearer token for /api/* endpoints
VOICE_DESK_API_TOKEN={api_token}

# Public URL where Twilio can reach this server
SERVER_EXTERNAL_URL={external_url}
"#,
        twilio_sid = values.twilio_account_sid,
        twilio_token = values.twilio_auth_token,
        openai_key = values.openai_api_key,
        anthropic_key = values.anthropic_api_key,
        groq_key = values.groq_api_key,
        elevenlabs_key = values.elevenlabs_api_key,
        api_token = values.api_token,
        external_url = values.external_url,
    );

    fs::write(path, &content).expect("Failed to write .env");

    // Set restrictive permissions: owner read/write only
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).expect("Failed to set .env permissions");

    println!(
        "  {} {} {}",
        ansi::green("\u{2713}"),
        path.display(),
        ansi::dim("(mode 0600)")
    );
}

/// Copy the current binary to /usr/local/bin/voice-desk.
pub fn install_binary() {
    let current_exe = std::env::current_exe().expect("Failed to get current executable path");
    let target = Path::new("/usr/local/bin/voice-desk");

    match fs::copy(&current_exe, target) {
        Ok(_) => {
            // Make executable
            let perms = fs::Permissions::from_mode(0o755);
            fs::set_permissions(target, perms).ok();
            println!(
                "  {} Copied to {}",
                ansi::green("\u{2713}"),
                target.display()
            );
        }
        Err(e) => {
            println!(
                "  {} Failed to copy binary: {} (try running with sudo)",
                ansi::red("\u{2717}"),
                e
            );
        }
    }
}

/// Write a systemd service unit to /etc/systemd/system/.
pub fn install_systemd() {
    let unit = r#"[Unit]
Description=voice-desk — Multi-provider AI voice agent
After=network.target

[Service]
Type=simple
User=root
ExecStart=/usr/local/bin/voice-desk
Environment=RUST_LOG=voice_desk=info,tower_http=info
Restart=on-failure
RestartSec=5

[Install]
WantedBy=multi-user.target
"#;

    let path = Path::new("/etc/systemd/system/voice-desk.service");
    match fs::write(path, unit) {
        Ok(_) => {
            println!("  {} {}", ansi::green("\u{2713}"), path.display());
            println!(
                "  {}",
                ansi::dim("Run: systemctl daemon-reload && systemctl enable --now voice-desk")
            );
        }
        Err(e) => {
            println!(
                "  {} Failed to write service: {} (try running with sudo)",
                ansi::red("\u{2717}"),
                e
            );
        }
    }
}

/// Write an nginx reverse proxy config for the given domain.
pub fn install_nginx(external_url: &str) {
    // Extract domain from URL
    let domain = external_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');

    let config = format!(
        r#"server {{
    listen 443 ssl;
    server_name {domain};

    ssl_certificate /etc/letsencrypt/live/{domain}/fullchain.pem;
    ssl_certificate_key /etc/letsencrypt/live/{domain}/privkey.pem;

    # Twilio voice webhooks
    location /twilio/ {{
        proxy_pass http://127.0.0.1:8443;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}

    # Cached synthesized audio for <Play>
    location /audio/ {{
        proxy_pass http://127.0.0.1:8443;
        proxy_set_header Host $host;
    }}

    # Outbound call API
    location /api/ {{
        proxy_pass http://127.0.0.1:8443;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}

    # Health check
    location /health {{
        proxy_pass http://127.0.0.1:8443;
    }}
}}

# Redirect HTTP to HTTPS
server {{
    listen 80;
    server_name {domain};

    location /.well-known/acme-challenge/ {{
        root /var/www/html;
    }}

    location / {{
        return 301 https://$host$request_uri;
    }}
}}
"#,
        domain = domain,
    );

    let path = Path::new("/etc/nginx/sites-available/voice-desk");

    match fs::write(path, &config) {
        Ok(_) => {
            println!("  {} {}", ansi::green("\u{2713}"), path.display());
            println!(
                "  {}",
                ansi::dim("Run: ln -sf /etc/nginx/sites-available/voice-desk /etc/nginx/sites-enabled/ && nginx -t && systemctl reload nginx")
            );
        }
        Err(e) => {
            println!(
                "  {} Failed to write nginx config: {} (try running with sudo)",
                ansi::red("\u{2717}"),
                e
            );
        }
    }
}
