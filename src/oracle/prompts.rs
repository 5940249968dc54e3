//! 提示词：裁判与玩家的消息拼装

use crate::agent::HistoryStep;
use crate::llm::Message;
use crate::oracle::OracleContext;

pub const JUDGE_SYSTEM_PROMPT: &str = "You are an expert Magic: The Gathering judge. \
Your job is to enforce the rules of a game played by two players. \
You change the game state only by writing mutation scripts made of the operations described in the reply schema.";

/// 步骤名与 `TurnStep` 的线上格式一致，裁判可直接用于 set_step
const TURN_STRUCTURE: &str = "Turn structure: UNTAP, UPKEEP, DRAW, MAIN_1, BEGIN_COMBAT, DECLARE_ATTACKERS, \
DECLARE_BLOCKERS, FIRST_STRIKE_DAMAGE, COMBAT_DAMAGE, END_COMBAT, MAIN_2, END, CLEANUP. \
Players receive priority in every step except untap and cleanup.";

const ADVANCE_GUIDE: &str = "Please advance the game:
1. Identify the current step.
2. Execute the automatic actions of this step (untapping, drawing, damage wearing off) that happen before players get priority.
3. Move to the next step when all players pass priority with an empty stack.
4. Stop at the next point where a player has to make a decision and name that player.";

const PLAYER_ADVICE: &str = "Remember that cost 2UU means 2 generic mana plus 2 blue mana, so 4 mana in total.

Action format examples:
- Play a land: \"Play [Land Name]\"
- Cast a spell: \"Cast [Spell Name] targeting [target]\", or \"Cast [Spell Name] tapping [lands]\" when payment choices matter
- Attack: \"Attack with [Creature Name(s)]\" or \"Attack with battlefield ID [ID]\"
- Activate ability: \"Activate [ability] on [card/battlefield ID]\"
- Pass priority: \"Pass\"

Always be specific about which cards you mean, especially when several copies exist.";

fn judge_base(ctx: &OracleContext) -> Vec<Message> {
    let mut body = format!(
        "{TURN_STRUCTURE}\n\nCurrent game state:\n{}\n\nPlayer {} holds priority.\n",
        ctx.state_rendering, ctx.priority_player
    );

    if !ctx.action_log.is_empty() {
        body.push_str("\nActions so far:\n");
        for record in &ctx.action_log {
            body.push_str(&format!("{}. player {}: {}\n", record.seq, record.participant, record.action));
        }
    }

    if !ctx.script_history.is_empty() {
        body.push_str("\nPreviously executed scripts, oldest first:\n");
        for script in &ctx.script_history {
            body.push_str(&script.to_json());
            body.push('\n');
        }
    }

    if !ctx.recent_errors.is_empty() {
        body.push_str("\nRecent errors in this game:\n");
        for error in &ctx.recent_errors {
            body.push_str(&format!("- {error}\n"));
        }
    }

    vec![Message::system(JUDGE_SYSTEM_PROMPT), Message::user(body)]
}

fn reply_instruction(schema: &serde_json::Value, error_feedback: &[String]) -> String {
    let mut text = String::new();
    if !error_feedback.is_empty() {
        text.push_str("Your previous scripts failed to execute:\n");
        for report in error_feedback {
            text.push_str(&format!("- {report}\n"));
        }
        text.push_str("Write a corrected script.\n\n");
    }
    text.push_str(&format!(
        "Reply with a single JSON object matching this schema:\n```json\n{}\n```",
        schema
    ));
    text
}

pub fn validation_messages(
    ctx: &OracleContext,
    action: &str,
    schema: &serde_json::Value,
) -> Vec<Message> {
    let mut messages = judge_base(ctx);
    messages.push(Message::user(format!(
        "Player {} proposes: \"{}\"\n\nFirst decide whether this action is legal. \
If it is, write the script that performs it. If not, explain to the player why.\n\n{}",
        ctx.priority_player,
        action,
        reply_instruction(schema, &ctx.error_feedback)
    )));
    messages
}

pub fn advance_messages(ctx: &OracleContext, schema: &serde_json::Value) -> Vec<Message> {
    let mut messages = judge_base(ctx);
    messages.push(Message::user(format!(
        "{ADVANCE_GUIDE}\n\n{}",
        reply_instruction(schema, &ctx.error_feedback)
    )));
    messages
}

pub fn analysis_messages(ctx: &OracleContext, schema: &serde_json::Value) -> Vec<Message> {
    let mut messages = judge_base(ctx);
    messages.push(Message::user(format!(
        "Extract the key information about the current position: who holds priority, \
what was revealed only to that player, the mana they have available, the actions they can take, \
and the winner if the game is over (null otherwise).\n\n{}",
        reply_instruction(schema, &[])
    )));
    messages
}

pub fn player_messages(
    history: &[HistoryStep],
    view: &str,
    available_actions: &str,
    feedback: Option<&str>,
) -> Vec<Message> {
    let system = format!(
        "You are an expert Magic: The Gathering player. Your job is to win a game played over \
natural language, talking to an expert judge who validates your actions.\nKeep these notes in mind:\n{PLAYER_ADVICE}"
    );

    let mut past = String::new();
    for (index, step) in history.iter().enumerate() {
        past.push_str(&format!(
            "--- step {index} ---\n{}\nAvailable: {}\nYou did: {}\n",
            step.visible_information,
            step.available_actions,
            step.action.as_deref().unwrap_or("(nothing yet)")
        ));
    }

    let mut body = format!(
        "Your history of past game states and actions:\n{past}\n\
Current state of the game:\n{view}\n\nActions available to you:\n{available_actions}\n"
    );
    if let Some(feedback) = feedback {
        body.push_str(&format!(
            "\nYour previous action was rejected by the judge:\n{feedback}\n"
        ));
    }
    body.push_str(
        "\nThink through your options, then give your chosen action on the last line prefixed with \"ACTION:\".",
    );

    vec![Message::system(system), Message::user(body)]
}
