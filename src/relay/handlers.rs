//! Built-in chat commands.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::common::error::RelayResult;
use crate::common::EVERYONE_ROLE;
use crate::protocol::rcon::RemoteConsole;
use crate::relay::registry::{CommandHandler, CommandRegistry, Invocation};

/// Token used for messages that carry none.
pub const DEFAULT_TOKEN: &str = "say";

/// Relays free text into the game through the author's avatar.
///
/// Each chat user gets one invisible armor stand tagged with their user id.
/// It is summoned only when missing and never removed here, so repeated use
/// reuses the same entity.
pub struct SayHandler {
    console: Arc<dyn RemoteConsole>,
    avatar_tag: String,
}

impl SayHandler {
    pub fn new(console: Arc<dyn RemoteConsole>, avatar_tag: impl Into<String>) -> Self {
        Self {
            console,
            avatar_tag: avatar_tag.into(),
        }
    }

    /// Command that summons the avatar for `user_id` unless one exists.
    pub fn summon_command(&self, user_id: u64, display_name: &str) -> String {
        // JSON text component inside a single-quoted SNBT string.
        let name = serde_json::json!({ "text": format!("@{}", display_name), "bold": true }).to_string();
        let name = name.replace('\\', "\\\\").replace('\'', "\\'");

        format!(
            "execute unless entity @e[type=armor_stand,limit=1,tag={id}] run summon armor_stand ~ ~ ~ \
             {{CustomNameVisible:0b,NoGravity:1b,Marker:1b,Invisible:1b,Tags:['{id}','{tag}'],CustomName:'{name}'}}",
            id = user_id,
            tag = self.avatar_tag,
            name = name,
        )
    }
}

#[async_trait]
impl CommandHandler for SayHandler {
    async fn handle(&self, invocation: &Invocation<'_>, args: &str) -> RelayResult<()> {
        // `say` takes a single line; other spacing is the speaker's.
        let text = args.replace("\r\n", " ").replace(['\r', '\n'], " ");
        let text = text.trim();
        if text.is_empty() {
            debug!("Nothing to say for {}", invocation.author.name);
            return Ok(());
        }

        let author = invocation.author;
        let summoned = self
            .console
            .command(&self.summon_command(author.id, &author.display_name))
            .await?;
        if !summoned.is_empty() {
            info!("Avatar for {}: {}", author.display_name, summoned);
        }

        self.console
            .command(&format!("execute as @e[tag={}] run say {}", author.id, text))
            .await?;
        info!("Discord -> Minecraft [{}]: {}", author.display_name, text);
        Ok(())
    }
}

/// Runs the arguments verbatim as a server command.
pub struct ConsoleCommandHandler {
    console: Arc<dyn RemoteConsole>,
}

impl ConsoleCommandHandler {
    pub fn new(console: Arc<dyn RemoteConsole>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl CommandHandler for ConsoleCommandHandler {
    async fn handle(&self, invocation: &Invocation<'_>, args: &str) -> RelayResult<()> {
        info!("{} runs server command: {}", invocation.author.name, args);
        let response = self.console.command(args).await?;
        invocation.reply.send(&format!("done. {}", response)).await
    }
}

/// Lists connected players.
pub struct WhoHandler {
    console: Arc<dyn RemoteConsole>,
}

impl WhoHandler {
    pub fn new(console: Arc<dyn RemoteConsole>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl CommandHandler for WhoHandler {
    async fn handle(&self, invocation: &Invocation<'_>, _args: &str) -> RelayResult<()> {
        let response = self.console.command("list").await?;
        invocation.reply.send(&format!("done. {}", response)).await
    }
}

/// Reports the public address resolved at startup.
pub struct IpHandler {
    address: String,
}

impl IpHandler {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for IpHandler {
    async fn handle(&self, invocation: &Invocation<'_>, _args: &str) -> RelayResult<()> {
        invocation
            .reply
            .send(&format!("Server public IP address is: {}", self.address))
            .await
    }
}

/// Lists commands, or shows the help text of one.
pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, invocation: &Invocation<'_>, args: &str) -> RelayResult<()> {
        let registry = invocation.registry;
        let wanted = args.trim().trim_start_matches('<').trim_end_matches('>');

        let reply = match registry.lookup(wanted) {
            Some(command) => format!("Help for {} : {}", command.display_token(), command.help),
            None => {
                let tokens: Vec<String> = registry.tokens().map(|t| format!("<{}>", t)).collect();
                format!(
                    "available commands: {}.  You can also ask for help on a specific command by entering '<help> cmd'",
                    tokens.join(",")
                )
            }
        };

        invocation.reply.send(&reply).await
    }
}

/// Reserved command that only answers with a fixed message.
pub struct PlaceholderHandler {
    reply: &'static str,
}

impl PlaceholderHandler {
    pub fn new(reply: &'static str) -> Self {
        Self { reply }
    }
}

#[async_trait]
impl CommandHandler for PlaceholderHandler {
    async fn handle(&self, invocation: &Invocation<'_>, _args: &str) -> RelayResult<()> {
        invocation.reply.send(self.reply).await
    }
}

/// Build the standard command table.
pub fn build_registry(
    console: Arc<dyn RemoteConsole>,
    privileged_role: &str,
    public_ip: &str,
    avatar_tag: &str,
) -> RelayResult<CommandRegistry> {
    CommandRegistry::builder()
        .command(
            "say",
            &[EVERYONE_ROLE],
            "Send a message to everyone on the mc server. Usage: '<say> message'",
            Arc::new(SayHandler::new(console.clone(), avatar_tag)),
        )
        .command(
            "cmd",
            &[privileged_role],
            "Runs a command on the Server. Usage: '<cmd> minecraft_command'",
            Arc::new(ConsoleCommandHandler::new(console.clone())),
        )
        .command(
            "count-mobs",
            &[EVERYONE_ROLE],
            "Counts the mobs on the server. Usage: '<count-mobs>'",
            Arc::new(PlaceholderHandler::new("1, 2, 3, 4, ..   yes there are lots.")),
        )
        .command(
            "server-off",
            &[privileged_role],
            "Turns off the server. Usage: '<server-off>'",
            Arc::new(PlaceholderHandler::new("I'm afraid i cant do that dave")),
        )
        .command(
            "help",
            &[EVERYONE_ROLE],
            "Yes, you need help :)",
            Arc::new(HelpHandler),
        )
        .command(
            "who",
            &[EVERYONE_ROLE],
            "List players on server.",
            Arc::new(WhoHandler::new(console)),
        )
        .command(
            "ip",
            &[EVERYONE_ROLE],
            "Get the public IP address of the server.",
            Arc::new(IpHandler::new(public_ip)),
        )
        .build(DEFAULT_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{author, FakeConsole, RecordingSink};

    fn registry(console: Arc<FakeConsole>) -> CommandRegistry {
        build_registry(console, "mc cmds", "203.0.113.7", "discord").unwrap()
    }

    async fn run(registry: &CommandRegistry, token: &str, args: &str) -> (RelayResult<()>, Vec<String>) {
        let sink = RecordingSink::default();
        let steve = author("Steve", &[]);
        let invocation = Invocation {
            author: &steve,
            reply: &sink,
            registry,
        };
        let result = registry
            .lookup(token)
            .unwrap()
            .handler
            .handle(&invocation, args)
            .await;
        (result, sink.messages())
    }

    #[test]
    fn test_standard_tokens() {
        let registry = registry(Arc::new(FakeConsole::default()));
        assert_eq!(
            registry.tokens().collect::<Vec<_>>(),
            vec!["say", "cmd", "count-mobs", "server-off", "help", "who", "ip"]
        );
        assert_eq!(registry.default_command().token, "say");
        assert_eq!(registry.lookup("cmd").unwrap().allowed_roles, vec!["mc cmds"]);
        assert_eq!(registry.lookup("server-off").unwrap().allowed_roles, vec!["mc cmds"]);
    }

    #[tokio::test]
    async fn test_say_creates_avatar_once() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());

        run(&registry, "say", "hello").await.0.unwrap();
        run(&registry, "say", "again").await.0.unwrap();

        assert_eq!(console.summons(), 1);
        let commands = console.commands();
        assert_eq!(commands.len(), 4);
        assert!(commands[0].starts_with("execute unless entity @e[type=armor_stand,limit=1,tag=1005]"));
        assert!(commands[0].contains("Tags:['1005','discord']"));
        assert_eq!(commands[1], "execute as @e[tag=1005] run say hello");
        assert_eq!(commands[3], "execute as @e[tag=1005] run say again");
    }

    #[tokio::test]
    async fn test_say_collapses_line_breaks_and_skips_empty() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());

        run(&registry, "say", "  ").await.0.unwrap();
        assert!(console.commands().is_empty());

        run(&registry, "say", "one\ntwo").await.0.unwrap();
        assert_eq!(console.commands()[1], "execute as @e[tag=1005] run say one two");
    }

    #[tokio::test]
    async fn test_say_keeps_inner_spacing() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());

        run(&registry, "say", "a  b\tc\r\nd").await.0.unwrap();
        assert_eq!(console.commands()[1], "execute as @e[tag=1005] run say a  b\tc d");
    }

    #[test]
    fn test_summon_name_is_escaped() {
        let handler = SayHandler::new(Arc::new(FakeConsole::default()), "discord");
        let command = handler.summon_command(7, "O'Brien \"The\" Builder");
        assert!(command.contains(r#"CustomName:'{"bold":true,"text":"@O\'Brien \\"The\\" Builder"}'"#)
            || command.contains(r#"CustomName:'{"text":"@O\'Brien \\"The\\" Builder","bold":true}'"#));
    }

    #[tokio::test]
    async fn test_cmd_replies_with_response() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());

        let (result, replies) = run(&registry, "cmd", "time set day").await;
        result.unwrap();
        assert_eq!(console.commands(), vec!["time set day"]);
        assert_eq!(replies, vec!["done. "]);
    }

    #[tokio::test]
    async fn test_who_lists_players() {
        let registry = registry(Arc::new(FakeConsole::default()));
        let (_, replies) = run(&registry, "who", "").await;
        assert_eq!(
            replies,
            vec!["done. There are 1 of a max of 20 players online: Steve"]
        );
    }

    #[tokio::test]
    async fn test_ip_uses_startup_address() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());
        let (_, replies) = run(&registry, "ip", "").await;
        assert_eq!(replies, vec!["Server public IP address is: 203.0.113.7"]);
        assert!(console.commands().is_empty());
    }

    #[tokio::test]
    async fn test_help_variants() {
        let registry = registry(Arc::new(FakeConsole::default()));

        let (_, replies) = run(&registry, "help", "cmd").await;
        assert_eq!(
            replies,
            vec!["Help for <cmd> : Runs a command on the Server. Usage: '<cmd> minecraft_command'"]
        );

        let (_, listed) = run(&registry, "help", "").await;
        assert_eq!(
            listed,
            vec!["available commands: <say>,<cmd>,<count-mobs>,<server-off>,<help>,<who>,<ip>.  You can also ask for help on a specific command by entering '<help> cmd'"]
        );

        let (_, unknown) = run(&registry, "help", "fly").await;
        assert_eq!(unknown, listed);
    }

    #[tokio::test]
    async fn test_placeholders_do_not_touch_server() {
        let console = Arc::new(FakeConsole::default());
        let registry = registry(console.clone());

        let (_, mobs) = run(&registry, "count-mobs", "").await;
        let (_, off) = run(&registry, "server-off", "").await;

        assert_eq!(mobs, vec!["1, 2, 3, 4, ..   yes there are lots."]);
        assert_eq!(off, vec!["I'm afraid i cant do that dave"]);
        assert!(console.commands().is_empty());
    }

    #[tokio::test]
    async fn test_console_failure_propagates_to_caller() {
        let registry = registry(Arc::new(FakeConsole::failing()));
        let (result, replies) = run(&registry, "who", "").await;
        assert!(result.is_err());
        assert!(replies.is_empty());
    }
}
