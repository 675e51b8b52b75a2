pub mod telegram;
pub mod terminal;

use std::fmt::Write;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::model::TimeFrame;
use crate::scorer::{Direction, Signal};

/// Outbound sink for rendered signals.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>>;
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_price(p: f64) -> String {
    if p.abs() >= 1.0 {
        format!("{p:.2}")
    } else {
        format!("{p:.6}")
    }
}

/// Telegram-flavoured HTML block for one signal.
pub fn render_signal(symbol: &str, timeframe: TimeFrame, signal: &Signal) -> String {
    let marker = match signal.direction {
        Direction::Long => "🟢",
        Direction::Short => "🔴",
        Direction::Neutral => "⚪",
    };
    let mut out = format!(
        "{marker} <b>{} · {timeframe}</b>\n<b>{}</b> strength {} (score {:+})\n",
        escape_html(symbol),
        signal.direction,
        signal.strength,
        signal.score,
    );

    if let Some(levels) = &signal.levels {
        let _ = write!(
            out,
            "\nEntry: <code>{}</code>\nStop: <code>{}</code>\nTP1: <code>{}</code>\nTP2: <code>{}</code>\n",
            format_price(levels.entry),
            format_price(levels.stop_loss),
            format_price(levels.take_profit1),
            format_price(levels.take_profit2),
        );
    }

    if !signal.reasons.is_empty() {
        out.push('\n');
        for reason in &signal.reasons {
            let _ = writeln!(out, "• {}", escape_html(reason));
        }
    }
    out
}
