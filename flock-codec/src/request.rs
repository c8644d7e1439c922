use crate::Error;
use bytes::{BufMut, BytesMut};

/// A command sent to a peer, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Periodic liveness assertion from the leader.
    Heartbeat { term: u64, leader: String },
    /// Vote solicitation from a candidate.
    Vote { term: u64, candidate: String },
}

impl Request {
    /// Parses a request line. The line is split into a command word and its
    /// arguments; each command takes exactly `<term> <name>`.
    pub fn parse(line: &str) -> Result<Request, Error> {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let cmd = match parts.next() {
            Some(cmd) if !cmd.is_empty() => cmd,
            _ => return Err(Error::EmptyLine),
        };
        let rest = parts.next().unwrap_or("");

        match cmd {
            "heartbeat" => {
                let (term, leader) = parse_args(cmd, rest)?;
                Ok(Request::Heartbeat { term, leader })
            }
            "vote" => {
                let (term, candidate) = parse_args(cmd, rest)?;
                Ok(Request::Vote { term, candidate })
            }
            _ => Err(Error::UnknownCommand(cmd.to_string())),
        }
    }

    pub fn to_buf(&self, buf: &mut BytesMut) {
        let line = match self {
            Request::Heartbeat { term, leader } => format!("heartbeat {} {}\n", term, leader),
            Request::Vote { term, candidate } => format!("vote {} {}\n", term, candidate),
        };
        buf.put_slice(line.as_bytes());
    }
}

fn parse_args(cmd: &str, rest: &str) -> Result<(u64, String), Error> {
    let mut tokens = rest.split_whitespace();
    let term = tokens
        .next()
        .ok_or_else(|| Error::WrongArity(cmd.to_string()))?;
    let name = tokens
        .next()
        .ok_or_else(|| Error::WrongArity(cmd.to_string()))?;
    if tokens.next().is_some() {
        return Err(Error::WrongArity(cmd.to_string()));
    }

    let term = term
        .parse()
        .map_err(|_| Error::InvalidTerm(term.to_string()))?;

    Ok((term, name.to_string()))
}
