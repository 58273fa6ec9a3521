/**
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

use thiserror::Error;

use crate::source::{Pos, Source};

/// Errors that abort compilation. The partially built graph is discarded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A `]` with no open `[`.
    #[error("unexpected ']'")]
    UnmatchedClose { at: Pos },

    /// End of input reached with at least one `[` still open.
    #[error("expected ']' before EOF")]
    UnterminatedLoop { at: Pos, opened_at: Pos },

    /// The builder produced a graph that fails verification.
    #[error("{message}")]
    Internal { message: String },
}

impl CompileError {
    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }

    pub fn pos(&self) -> Option<Pos> {
        match self {
            CompileError::UnmatchedClose { at } | CompileError::UnterminatedLoop { at, .. } => Some(*at),
            CompileError::Internal { .. } => None,
        }
    }

    pub fn render(&self, src: &[u8], path: Option<&str>) -> String {
        let Some(pos) = self.pos() else {
            return format!("internal error: {}", self);
        };
        let source = Source::new(src);
        let (src_line, caret) = source.render_pos(pos);

        let loc = match path {
            Some(p) => format!("{}:{}", p, pos),
            None => pos.to_string(),
        };

        let mut out = format!("{}: error: {}\n{}\n{}", loc, self, src_line, caret);
        if let CompileError::UnterminatedLoop { opened_at, .. } = self {
            out.push_str(&format!("\nnote: loop opened at {}", opened_at));
        }
        out
    }
}

/// Errors raised while executing a finished module.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no function named '{0}'")]
    MissingFunction(String),

    #[error("external function '{0}' has no host binding")]
    UnboundExternal(String),

    #[error("null cell dereferenced in '{func}'")]
    NullCell { func: String },

    #[error("malformed module in '{func}': {message}")]
    Malformed { func: String, message: String },

    #[error("step budget of {0} exhausted")]
    OutOfFuel(u64),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_close_renders_location_and_caret() {
        let err = CompileError::UnmatchedClose { at: Pos::new(2, 3) };
        let rendered = err.render(b"+\n++]\n", Some("prog.b"));
        assert!(rendered.starts_with("prog.b:2:3: error: unexpected ']'"), "rendered:\n{rendered}");
        assert!(rendered.contains("++]"), "rendered:\n{rendered}");
        assert!(rendered.ends_with("  ^"), "rendered:\n{rendered}");
    }

    #[test]
    fn unterminated_loop_mentions_opening_bracket() {
        let err = CompileError::UnterminatedLoop {
            at: Pos::new(1, 2),
            opened_at: Pos::new(1, 1),
        };
        let rendered = err.render(b"[+", None);
        assert!(rendered.starts_with("1:2: error: expected ']' before EOF"), "rendered:\n{rendered}");
        assert!(rendered.contains("note: loop opened at 1:1"), "rendered:\n{rendered}");
    }
}
