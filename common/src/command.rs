use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockCommand {
    Lock,
    Unlock,
}

impl LockCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandBody {
    pub command: &'static str,
    pub parameter: &'static str,
    #[serde(rename = "commandType")]
    pub command_type: &'static str,
}

impl CommandBody {
    pub fn new(command: LockCommand) -> Self {
        Self {
            command: command.as_str(),
            parameter: "default",
            command_type: "command",
        }
    }

    pub fn to_json(&self) -> String {
        // OK unwrap: a struct of static strings always serializes
        serde_json::to_string(self).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_minified_json() {
        assert_eq!(
            CommandBody::new(LockCommand::Unlock).to_json(),
            r#"{"command":"unlock","parameter":"default","commandType":"command"}"#
        );
        assert_eq!(
            CommandBody::new(LockCommand::Lock).to_json(),
            r#"{"command":"lock","parameter":"default","commandType":"command"}"#
        );
    }
}
