//! Builds the pipeline description of one line inside the session arenas.
//!
//! Grammar: `word+ ('|' word+)* ('<' word)? ('>' word)? ('&')?`, where `<` may only
//! attach to the first stage, `>` only to the last one, and `&` must end the line.
//!
//! Stages are laid out left to right in the arena but linked right to left: the
//! parsed line refers to the last stage, and each stage points to the one before
//! it. Execution starts from the last stage and walks back towards the first.

use crate::arena::{Arena, ArenaError, Stage, StageId};
use crate::lexer::{estimate_size, LineBuffer, Lexer, Operator, Span, Token};
use log::debug;
use std::ffi::CStr;
use thiserror::Error;

/// States of the parsing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// A token was just consumed and more may follow.
    AcceptingToken,
    /// The next word starts a new stage.
    CommandExpected,
    /// The next word is the input redirection target.
    StdinTargetExpected,
    /// The next word is the output redirection target.
    StdoutTargetExpected,
    /// `&` was seen; nothing may follow it.
    BackgroundSet,
}

/// Errors that can occur while parsing a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// An operator appeared where the grammar does not allow one.
    #[error("Unexpected {0}")]
    Unexpected(Operator),
    /// `<` attached to a stage other than the first.
    #[error("Cannot redirect stdin")]
    CannotRedirectStdin,
    /// `>` attached to a stage other than the last.
    #[error("Cannot redirect stdout")]
    CannotRedirectStdout,
    /// A word followed the background marker.
    #[error("Illegal background")]
    IllegalBackground,
    /// The line ended while the parser still expected something.
    #[error("Incomplete command line")]
    Incomplete(ParseState),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// The fully parsed form of one line.
///
/// Borrows both the line buffer (the argument strings) and the arena (the stage
/// records), so neither can be reused until this value is dropped.
#[derive(Debug, Clone, Copy)]
pub struct ParsedLine<'s> {
    line: &'s LineBuffer,
    arena: &'s Arena,
    last: StageId,
    stdin: Option<Span>,
    stdout: Option<Span>,
    background: bool,
    pipe_count: usize,
    state: ParseState,
}

impl<'s> ParsedLine<'s> {
    /// The textually last stage, where execution starts.
    pub fn last_stage(&self) -> Result<StageRef<'s>, ArenaError> {
        StageRef::new(self.line, self.arena, self.last)
    }

    /// The textually first stage.
    pub fn first_stage(&self) -> Result<StageRef<'s>, ArenaError> {
        let mut stage = self.last_stage()?;
        while let Some(prev) = stage.prev()? {
            stage = prev;
        }
        Ok(stage)
    }

    /// Stages from last to first, following the backward links.
    pub fn stages(&self) -> Result<Vec<StageRef<'s>>, ArenaError> {
        let mut stages = Vec::with_capacity(self.pipe_count + 1);
        let mut next = Some(self.last_stage()?);
        while let Some(stage) = next {
            next = stage.prev()?;
            stages.push(stage);
        }
        Ok(stages)
    }

    /// Input redirection target of the first stage.
    pub fn stdin(&self) -> Option<&'s CStr> {
        self.stdin.and_then(|span| self.line.word(span))
    }

    /// Output redirection target of the last stage.
    pub fn stdout(&self) -> Option<&'s CStr> {
        self.stdout.and_then(|span| self.line.word(span))
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Number of pipes, one less than the number of stages.
    pub fn pipe_count(&self) -> usize {
        self.pipe_count
    }

    pub fn state(&self) -> ParseState {
        self.state
    }
}

/// A view of one stage of a [`ParsedLine`].
#[derive(Debug, Clone, Copy)]
pub struct StageRef<'s> {
    line: &'s LineBuffer,
    arena: &'s Arena,
    id: StageId,
    stage: Stage,
}

impl<'s> StageRef<'s> {
    fn new(line: &'s LineBuffer, arena: &'s Arena, id: StageId) -> Result<Self, ArenaError> {
        let stage = *arena.stage(id)?;
        Ok(StageRef {
            line,
            arena,
            id,
            stage,
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.stage.depth
    }

    /// Number of arguments, program name included.
    pub fn len(&self) -> usize {
        self.stage.length
    }

    /// The stage before this one in the text, `None` for the first stage.
    pub fn prev(&self) -> Result<Option<StageRef<'s>>, ArenaError> {
        self.stage
            .prev
            .map(|id| StageRef::new(self.line, self.arena, id))
            .transpose()
    }

    /// The arguments, program name first.
    pub fn args(&self) -> impl Iterator<Item = &'s CStr> + 's {
        let line = self.line;
        let arena: &'s Arena = self.arena;
        arena
            .args(&self.stage)
            .iter()
            .filter_map(move |slot| slot.and_then(|span| line.word(span)))
    }

    pub fn argv(&self) -> Vec<&'s CStr> {
        self.args().collect()
    }

    /// Whether the slot after the last argument holds the end-of-arguments marker.
    pub fn is_terminated(&self) -> bool {
        self.arena.terminator(&self.stage) == Some(None)
    }
}

/// Parser state while a line is being consumed.
struct Parser<'a> {
    arena: &'a mut Arena,
    state: ParseState,
    current: StageId,
    cursor: usize,
    pipe_count: usize,
    stdin: Option<Span>,
    stdout: Option<Span>,
    background: bool,
}

impl<'a> Parser<'a> {
    fn new(arena: &'a mut Arena, pipe_count: usize) -> Result<Self, ParseError> {
        *arena.stage_mut(0)? = Stage::default();
        Ok(Parser {
            arena,
            state: ParseState::CommandExpected,
            current: 0,
            cursor: 0,
            pipe_count,
            stdin: None,
            stdout: None,
            background: false,
        })
    }

    fn parse_word(&mut self, span: Span) -> Result<(), ParseError> {
        match self.state {
            ParseState::StdinTargetExpected => self.stdin = Some(span),
            ParseState::StdoutTargetExpected => self.stdout = Some(span),
            ParseState::BackgroundSet => return Err(ParseError::IllegalBackground),
            ParseState::AcceptingToken | ParseState::CommandExpected => {
                self.arena.set_item(self.cursor, Some(span))?;
                self.cursor += 1;
                self.arena.stage_mut(self.current)?.length += 1;
            }
        }
        self.state = ParseState::AcceptingToken;
        Ok(())
    }

    fn parse_operator(&mut self, op: Operator) -> Result<(), ParseError> {
        // Two operators in a row are never valid.
        if self.state != ParseState::AcceptingToken {
            return Err(ParseError::Unexpected(op));
        }

        let depth = self.arena.stage(self.current)?.depth;
        match op {
            Operator::Pipe => {
                self.terminate_current()?;
                let next = self.current + 1;
                *self.arena.stage_mut(next)? = Stage {
                    items: self.cursor,
                    length: 0,
                    depth: depth + 1,
                    prev: Some(self.current),
                };
                self.current = next;
                self.state = ParseState::CommandExpected;
            }
            Operator::RedirectIn => {
                if depth != 0 {
                    return Err(ParseError::CannotRedirectStdin);
                }
                self.state = ParseState::StdinTargetExpected;
            }
            Operator::RedirectOut => {
                if depth != self.pipe_count {
                    return Err(ParseError::CannotRedirectStdout);
                }
                self.state = ParseState::StdoutTargetExpected;
            }
            Operator::Background => {
                self.background = true;
                self.state = ParseState::BackgroundSet;
            }
        }
        Ok(())
    }

    fn terminate_current(&mut self) -> Result<(), ParseError> {
        self.arena.set_item(self.cursor, None)?;
        self.cursor += 1;
        Ok(())
    }
}

/// Parses `line` into `arena`.
///
/// The line buffer is tokenized in place, and the returned [`ParsedLine`] keeps both
/// the buffer and the arena borrowed for as long as it lives.
pub fn parse<'s>(line: &'s mut LineBuffer, arena: &'s mut Arena) -> Result<ParsedLine<'s>, ParseError> {
    let size = estimate_size(line.text());
    arena.fit(size)?;

    let mut parser = Parser::new(&mut *arena, size.pipes)?;
    let mut lexer = Lexer::new(&mut *line);
    while lexer.has_next() {
        let Some(token) = lexer.next_token() else {
            break;
        };
        match token {
            Token::Op(op) => {
                parser.parse_operator(op)?;
                // `&` may end the line without anything after it.
                if op == Operator::Background && !lexer.has_next() {
                    parser.state = ParseState::AcceptingToken;
                }
            }
            Token::Word(span) => parser.parse_word(span)?,
        }
    }

    if parser.state != ParseState::AcceptingToken {
        return Err(ParseError::Incomplete(parser.state));
    }
    parser.terminate_current()?;

    let Parser {
        current: last,
        stdin,
        stdout,
        background,
        pipe_count,
        state,
        ..
    } = parser;
    debug!(
        "parsed {} stage(s), background: {}, redirects: {}/{}",
        pipe_count + 1,
        background,
        stdin.is_some(),
        stdout.is_some()
    );

    Ok(ParsedLine {
        line,
        arena,
        last,
        stdin,
        stdout,
        background,
        pipe_count,
        state,
    })
}
