//! Terminal rendering of the live ranking.

use std::io::{self, Stdout, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use monocle_core::model::Tier;
use monocle_core::services::ranking::{RenderedTable, TableSink};
use tracing::debug;

const ORANGE: Color = Color::Rgb { r: 255, g: 175, b: 0 };

pub fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::Top => Color::Green,
        Tier::Mid => ORANGE,
        Tier::Low => Color::Red,
    }
}

/// Redraws the whole table on every update.
pub struct TerminalSink<W: Write> {
    out: W,
    clear: bool,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout(), clear: true }
    }
}

impl<W: Write> TerminalSink<W> {
    /// Sink writing to `out`. With `clear` unset, tables are appended instead of redrawn.
    pub fn new(out: W, clear: bool) -> Self {
        Self { out, clear }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TableSink for TerminalSink<W> {
    fn publish(&mut self, table: &RenderedTable) {
        if let Err(err) = draw(&mut self.out, table, self.clear) {
            debug!("failed to draw ranking: {err}");
        }
    }
}

/// Write `table` to `out`, optionally clearing the screen first.
pub fn draw<W: Write>(out: &mut W, table: &RenderedTable, clear: bool) -> io::Result<()> {
    if clear {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    }

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.len()).collect();
    for row in &table.rows {
        widths[0] = widths[0].max(row.binary_name.len());
        widths[1] = widths[1].max(row.function_name.len());
        widths[2] = widths[2].max(row.score.to_string().len());
    }

    queue!(out, SetAttribute(Attribute::Bold), Print(&table.title), SetAttribute(Attribute::Reset), Print("\n"))?;
    for (i, column) in table.columns.iter().enumerate() {
        let cell = if i + 1 == table.columns.len() {
            column.clone()
        } else {
            format!("{column:<width$}  ", width = widths[i])
        };
        queue!(out, SetAttribute(Attribute::Bold), Print(cell), SetAttribute(Attribute::Reset))?;
    }
    queue!(out, Print("\n"))?;

    for row in &table.rows {
        let color = tier_color(row.tier);
        queue!(
            out,
            Print(format!("{:<w0$}  {:<w1$}  ", row.binary_name, row.function_name, w0 = widths[0], w1 = widths[1])),
            SetForegroundColor(color),
            Print(format!("{:<w2$}  ", row.score, w2 = widths[2])),
            Print(&row.explanation),
            ResetColor,
            Print("\n")
        )?;
    }

    queue!(out, SetAttribute(Attribute::Italic), Print(&table.caption), SetAttribute(Attribute::Reset), Print("\n"))?;
    out.flush()
}
