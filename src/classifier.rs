use tracing::error;

use crate::gemini::TextModel;

/// The classified purpose of one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Conversational; the text is relayed to the user verbatim.
    Chat(String),
    /// Record-keeping; persisted as a structured note.
    Note(Note),
}

/// A title/tag/body triple destined for the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub title: String,
    pub tag: String,
    pub body: String,
}

const DELIMITER: &str = "|||";

/// Reply substituted when the model call itself fails.
pub const FALLBACK_REPLY: &str = "🙏 抱歉，我現在無法處理這則訊息，請稍後再試。";

fn prompt_for(text: &str) -> String {
    format!(
        r#"你是一個個人助理。請判斷使用者的輸入是閒聊，還是需要記錄的筆記。
使用者輸入: "{text}"

若是閒聊，請嚴格依照以下格式回傳：
CHAT|||回覆內容

若是筆記，請嚴格依照以下格式回傳，用 "|||" 分隔四個部分：
SAVE|||標題|||標籤|||詳細內文

規則：
1. 標籤請從這幾個選一個最適合的：[待辦, 筆記, 學校, 靈感, 購物]
2. 內文請整理成易讀的格式

範例輸入: 明天要交VLSI作業，還要記得買牛奶
範例輸出: SAVE|||繳交作業與購物|||待辦|||- 完成 VLSI 作業
- 購買牛奶"#
    )
}

/// Parse raw model output into an intent.
///
/// Malformed output degrades to `Chat` instead of failing: no delimiter
/// means the whole text is conversational, and a truncated `SAVE` falls
/// back to its last segment. Output in the bare `標題|||標籤|||內文` form
/// (no leading keyword) is still accepted as a note.
pub fn parse_reply(raw: &str) -> Intent {
    let parts: Vec<&str> = raw.split(DELIMITER).collect();
    if parts.len() < 2 {
        return Intent::Chat(raw.trim().to_string());
    }

    let head = parts[0].trim();
    if head.eq_ignore_ascii_case("SAVE") && parts.len() >= 4 {
        return Intent::Note(Note {
            title: parts[1].trim().to_string(),
            tag: parts[2].trim().to_string(),
            body: parts[3].trim().to_string(),
        });
    }
    if head.eq_ignore_ascii_case("CHAT") {
        return Intent::Chat(parts[1].trim().to_string());
    }
    if !head.eq_ignore_ascii_case("SAVE") && parts.len() >= 3 {
        return Intent::Note(Note {
            title: head.to_string(),
            tag: parts[1].trim().to_string(),
            body: parts[2].trim().to_string(),
        });
    }

    // Truncated SAVE: surface the last segment rather than dropping it.
    Intent::Chat(parts.last().unwrap_or(&raw).trim().to_string())
}

/// Classify one message. Total: a model failure becomes a fixed `Chat`
/// reply and is logged, never raised.
pub async fn classify(model: &dyn TextModel, text: &str) -> Intent {
    match model.generate(&prompt_for(text)).await {
        Ok(raw) => parse_reply(&raw),
        Err(e) => {
            error!("Gemini error: {e}");
            Intent::Chat(FALLBACK_REPLY.to_string())
        }
    }
}
