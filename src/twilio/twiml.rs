use crate::calls::machine::{Instruction, Prompt};

/// Render a machine instruction as a TwiML document.
///
/// A listen instruction wraps the prompt in `<Gather input="speech">`; when
/// the gather times out without speech, the trailing `<Redirect>` posts back
/// to the same action with no SpeechResult, which the machine counts as an
/// empty listen attempt.
pub fn render(instruction: &Instruction, gather_action: &str) -> String {
    match instruction {
        Instruction::PromptAndListen { prompt } => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Gather input="speech" action="{action}" method="POST" speechTimeout="auto">
        {prompt}
    </Gather>
    <Redirect method="POST">{action}</Redirect>
</Response>"#,
            action = escape(gather_action),
            prompt = prompt_xml(prompt),
        ),
        Instruction::PromptAndHangup { prompt } => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    {prompt}
    <Hangup/>
</Response>"#,
            prompt = prompt_xml(prompt),
        ),
        Instruction::Hangup => r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Hangup/>
</Response>"#
            .to_string(),
    }
}

fn prompt_xml(prompt: &Prompt) -> String {
    match prompt {
        Prompt::Audio { url } => format!("<Play>{}</Play>", escape(url)),
        Prompt::Say { text, voice } => {
            format!(r#"<Say voice="{}">{}</Say>"#, escape(voice), escape(text))
        }
    }
}

fn escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&apos;".to_string(),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTION: &str = "https://desk.test/twilio/voice/gather";

    #[test]
    fn listen_wraps_prompt_in_gather() {
        let instruction = Instruction::PromptAndListen {
            prompt: Prompt::Say {
                text: "Hi, how can I help?".to_string(),
                voice: "Polly.Joanna".to_string(),
            },
        };
        let twiml = render(&instruction, ACTION);
        assert!(twiml.contains(r#"<Gather input="speech""#));
        assert!(twiml.contains(r#"<Say voice="Polly.Joanna">Hi, how can I help?</Say>"#));
        assert!(twiml.contains("<Redirect method=\"POST\">"));
        assert!(!twiml.contains("<Hangup/>"));
    }

    #[test]
    fn cached_audio_renders_as_play() {
        let instruction = Instruction::PromptAndListen {
            prompt: Prompt::Audio {
                url: "https://desk.test/audio/abc".to_string(),
            },
        };
        let twiml = render(&instruction, ACTION);
        assert!(twiml.contains("<Play>https://desk.test/audio/abc</Play>"));
    }

    #[test]
    fn farewell_speaks_then_hangs_up() {
        let instruction = Instruction::PromptAndHangup {
            prompt: Prompt::Say {
                text: "Goodbye!".to_string(),
                voice: "alice".to_string(),
            },
        };
        let twiml = render(&instruction, ACTION);
        assert!(twiml.contains("Goodbye!"));
        assert!(twiml.contains("<Hangup/>"));
        assert!(!twiml.contains("<Gather"));
    }

    #[test]
    fn bare_hangup_has_no_prompt() {
        let twiml = render(&Instruction::Hangup, ACTION);
        assert!(twiml.contains("<Hangup/>"));
        assert!(!twiml.contains("<Say"));
        assert!(!twiml.contains("<Play"));
    }

    #[test]
    fn speech_text_is_xml_escaped() {
        let instruction = Instruction::PromptAndHangup {
            prompt: Prompt::Say {
                text: r#"Rates < 5% & "fees""#.to_string(),
                voice: "alice".to_string(),
            },
        };
        let twiml = render(&instruction, ACTION);
        assert!(twiml.contains("Rates &lt; 5% &amp; &quot;fees&quot;"));
    }
}
