// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Offline stand-in for the external assistant: keyword table, first match wins.

struct Rule {
    keywords: &'static [&'static str],
    reply: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["你好", "hello"],
        reply: "你好！我是基於 RISC-V OS 的 AI 助手。",
    },
    Rule {
        keywords: &["幫助", "help"],
        reply: "我可以幫助你了解這個作業系統，或者回答一些基本問題。",
    },
    Rule {
        keywords: &["系統", "system"],
        reply: "這是一個 RISC-V 32位元作業系統，支援多工處理、虛擬記憶體和檔案系統。",
    },
    Rule {
        keywords: &["謝謝", "thank"],
        reply: "不客氣！還有什麼我可以幫助你的嗎？",
    },
];

pub const DEFAULT_REPLY: &str = "我理解你的輸入，這很有趣！請告訴我更多。";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Canned reply for `input`. Matching is a case-sensitive byte substring search.
pub fn reply_for(input: &[u8]) -> &'static str {
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|keyword| contains(input, keyword.as_bytes())))
        .map_or(DEFAULT_REPLY, |rule| rule.reply)
}
