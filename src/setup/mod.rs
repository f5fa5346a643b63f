mod ansi;
mod prompts;
mod writer;

use std::io::IsTerminal;

use rand::Rng;

use writer::SetupValues;

/// Entry point for `voice-desk --setup`.
pub fn run() {
    if !std::io::stdin().is_terminal() {
        eprintln!("Error: --setup requires an interactive terminal");
        std::process::exit(1);
    }

    println!();
    println!("  {}", ansi::bold("voice-desk setup"));
    println!("  {}", ansi::dim("Interactive configuration wizard"));

    // Twilio
    println!("\n  {} Twilio Configuration", ansi::bold(">>"));
    let twilio_account_sid = prompts::ask_secret("Account SID");
    let twilio_auth_token = prompts::ask_secret("Auth Token");
    let twilio_phone_number = loop {
        let num = prompts::ask("Phone Number (E.164)", None);
        if validate_e164(&num) {
            break num;
        }
        println!(
            "  {} Invalid E.164 format (expected: +<digits>)",
            ansi::red("!")
        );
    };

    // Language-model providers — at least one key keeps the router happy;
    // the rest widen the fallback chain
    println!("\n  {} Language-model providers", ansi::bold(">>"));
    let openai_api_key = prompts::ask_secret_optional("OpenAI API Key");
    let groq_api_key = prompts::ask_secret_optional("Groq API Key");
    let anthropic_api_key = prompts::ask_secret_optional("Anthropic API Key");
    if openai_api_key.is_empty() && groq_api_key.is_empty() && anthropic_api_key.is_empty() {
        println!(
            "  {} No language-model key configured — the agent cannot reply until one is added",
            ansi::yellow("!")
        );
    }

    // ElevenLabs
    println!("\n  {} ElevenLabs (TTS)", ansi::bold(">>"));
    let elevenlabs_api_key = prompts::ask_secret_optional("API Key");
    let elevenlabs_voice_id = prompts::ask("Voice ID", Some("EXAVITQu4vr4xnSDxMaL"));

    // Server
    println!("\n  {} Server", ansi::bold(">>"));
    let external_url = prompts::ask("External URL", None);

    // Generate API token
    let api_token = generate_hex_token(32);
    println!(
        "\n  {} Generated VOICE_DESK_API_TOKEN",
        ansi::green("\u{2713}")
    );

    // Write config files
    let values = SetupValues {
        twilio_account_sid,
        twilio_auth_token,
        twilio_phone_number,
        openai_api_key,
        anthropic_api_key,
        groq_api_key,
        elevenlabs_api_key,
        elevenlabs_voice_id,
        external_url: external_url.clone(),
        api_token,
    };

    writer::write_config(&values);

    // Optional system installation
    println!("\n  {} System installation (optional)", ansi::bold(">>"));

    if prompts::confirm("Copy binary to /usr/local/bin/?") {
        writer::install_binary();
    }

    if prompts::confirm("Install systemd service?") {
        writer::install_systemd();
    }

    if prompts::confirm("Generate nginx config?") {
        writer::install_nginx(&external_url);
    }

    // Done
    println!("\n  {} Setup complete!", ansi::green("\u{2713}"));
    println!();
    println!("  Next steps:");
    println!("    1. Review ~/.voice-desk/config.toml");
    println!("    2. Run: voice-desk");
    println!(
        "    3. Set your Twilio voice webhook to {}/twilio/voice",
        external_url
    );
    println!(
        "    4. Set the status callback to {}/twilio/voice/status",
        external_url
    );
    println!();
}

/// Basic E.164 validation: starts with +, followed by digits only, 8-15 total chars.
fn validate_e164(s: &str) -> bool {
    if !s.starts_with('+') || s.len() < 8 || s.len() > 16 {
        return false;
    }
    s[1..].chars().all(|c| c.is_ascii_digit())
}

/// Generate a hex token of `byte_len` random bytes (output is 2x byte_len chars).
fn generate_hex_token(byte_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..byte_len).map(|_| rng.gen()).collect();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_accepts_plus_and_digits() {
        assert!(validate_e164("+15550001111"));
        assert!(validate_e164("+34612345678"));
    }

    #[test]
    fn e164_rejects_bad_shapes() {
        assert!(!validate_e164("15550001111"));
        assert!(!validate_e164("+1555"));
        assert!(!validate_e164("+1555000111a"));
        assert!(!validate_e164("+12345678901234567"));
    }

    #[test]
    fn hex_token_has_expected_length() {
        let token = generate_hex_token(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
