use tracing::trace;

use crate::{
    ast::{Line, Node, Statement},
    error::{AssemblerError, AsmResult},
    source::SourceLoc,
};

enum Frame {
    Block {
        head: Line,
        body: Vec<Node>,
    },
    If {
        sections: Vec<(Line, Vec<Node>)>,
        has_else: bool,
    },
    Macro {
        head: Line,
        params: Vec<String>,
        body: Vec<Line>,
    },
}

impl Frame {
    fn head(&self) -> &Line {
        match self {
            Self::Block { head, .. } | Self::Macro { head, .. } => head,
            Self::If { sections, .. } => &sections[0].0,
        }
    }

    /// Whether `end` closes this frame.
    fn closed_by(&self, end: &Statement) -> bool {
        match self {
            Self::Macro { .. } => matches!(end, Statement::Endm),
            Self::If { .. } => matches!(end, Statement::Endif),
            Self::Block { head, .. } => matches!(
                (head.statement(), end),
                (Some(Statement::Loop(_)), Statement::Endl)
                    | (Some(Statement::Repeat), Statement::Until(_))
                    | (Some(Statement::While(_)), Statement::Endw)
                    | (Some(Statement::For { .. }), Statement::Next)
                    | (Some(Statement::Module(_)), Statement::EndModule)
                    | (Some(Statement::Proc), Statement::Endp)
                    | (Some(Statement::Struct), Statement::Ends)
            ),
        }
    }

    fn close(self, end: Line) -> Node {
        match self {
            Self::Block { head, body } => Node::Block { head, body, end },
            Self::If { sections, .. } => Node::If { sections, end },
            Self::Macro { head, params, body } => Node::Macro {
                head,
                params,
                body,
                end,
            },
        }
    }

    fn push(&mut self, node: Node) {
        match self {
            Self::Block { body, .. } => body.push(node),
            Self::If { sections, .. } => {
                if let Some((_, body)) = sections.last_mut() {
                    body.push(node);
                }
            }
            Self::Macro { body, .. } => {
                if let Node::Line(line) = node {
                    body.push(line);
                }
            }
        }
    }
}

fn is_end(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Endm
            | Statement::Endl
            | Statement::Until(_)
            | Statement::Endw
            | Statement::Next
            | Statement::EndModule
            | Statement::Endp
            | Statement::Ends
            | Statement::Endif
    )
}

fn missing_end(frame: &Frame) -> (SourceLoc, AssemblerError) {
    let head = frame.head();
    let statement = head.text.trim();
    (
        head.body_loc,
        AssemblerError::new("Z0701", format!("Missing the end of the block \"{statement}\"")),
    )
}

struct Builder {
    root: Vec<Node>,
    frames: Vec<Frame>,
    errors: Vec<(SourceLoc, AssemblerError)>,
}

impl Builder {
    fn push(&mut self, node: Node) {
        match self.frames.last_mut() {
            Some(frame) => frame.push(node),
            None => self.root.push(node),
        }
    }

    fn line(&mut self, line: Line) -> AsmResult<()> {
        if let Some(Frame::Macro { body, .. }) = self.frames.last_mut() {
            let nested = matches!(line.statement(), Some(Statement::Macro(_)));
            let end = matches!(line.statement(), Some(Statement::Endm));
            if nested {
                return asm_err!(line.body_loc, "Z1005", "Macro definitions cannot be nested");
            }
            if !end {
                body.push(line);
                return Ok(());
            }
        }

        let statement = match line.statement() {
            Some(statement) => statement.clone(),
            None => {
                self.push(Node::Line(line));
                return Ok(());
            }
        };

        match statement {
            Statement::Macro(params) => self.frames.push(Frame::Macro {
                head: line,
                params,
                body: Vec::new(),
            }),

            Statement::If(_) | Statement::IfUsed(_) | Statement::IfNUsed(_) => {
                self.frames.push(Frame::If {
                    sections: vec![(line, Vec::new())],
                    has_else: false,
                })
            }

            Statement::Elif(_) | Statement::Else => match self.frames.last_mut() {
                Some(Frame::If { has_else: true, .. }) => {
                    return asm_err!(
                        line.body_loc,
                        "Z0709",
                        "\"{}\" cannot follow an \".else\" section",
                        line.text.trim()
                    )
                }
                Some(Frame::If { sections, has_else }) => {
                    *has_else = statement == Statement::Else;
                    sections.push((line, Vec::new()));
                }
                _ => {
                    return asm_err!(
                        line.body_loc,
                        "Z0704",
                        "\"{}\" without an open \".if\"",
                        line.text.trim()
                    )
                }
            },

            Statement::Loop(_)
            | Statement::Repeat
            | Statement::While(_)
            | Statement::For { .. }
            | Statement::Module(_)
            | Statement::Proc
            | Statement::Struct => self.frames.push(Frame::Block {
                head: line,
                body: Vec::new(),
            }),

            end if is_end(&end) => {
                let depth = match self.frames.iter().rposition(|frame| frame.closed_by(&end)) {
                    Some(depth) => depth,
                    None => {
                        return asm_err!(
                            line.body_loc,
                            "Z0704",
                            "\"{}\" without a matching block start",
                            line.text.trim()
                        )
                    }
                };
                while self.frames.len() > depth + 1 {
                    if let Some(inner) = self.frames.pop() {
                        self.errors.push(missing_end(&inner));
                    }
                }
                if let Some(frame) = self.frames.pop() {
                    trace!("Closed block at line {}", frame.head().loc.line);
                    let node = frame.close(line);
                    self.push(node);
                }
            }

            _ => self.push(Node::Line(line)),
        }
        Ok(())
    }
}

/// Folds parsed lines into nested block nodes. Structural errors are reported
/// without stopping, so one misplaced end does not hide the others.
pub fn build_blocks(lines: Vec<Line>) -> (Vec<Node>, Vec<(SourceLoc, AssemblerError)>) {
    let mut builder = Builder {
        root: Vec::new(),
        frames: Vec::new(),
        errors: Vec::new(),
    };
    for line in lines {
        if let Err(e) = builder.line(line) {
            builder.errors.push(e);
        }
    }
    while let Some(frame) = builder.frames.pop() {
        builder.errors.push(missing_end(&frame));
    }
    (builder.root, builder.errors)
}
