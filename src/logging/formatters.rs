use std::{fmt::Write, path::Path};

use chrono::Local;

use super::LogFormatter;
use crate::{
    error::{Error, Result},
    trace::escape,
    utils,
};

pub const DEFAULT_FORMAT: &str = "'level'='{level}'; 'datetime'='{datetime}'; \
'process_name'='{process_name}'; 'pid'='{pid}'; 'thread'='{thread}'; \
'module'='{module}'; 'line'='{line}'; 'message'='{message}'";

pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Level,
    Datetime,
    ProcessName,
    Pid,
    Thread,
    Module,
    Line,
    Message,
    Name,
    Exception,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "level" => Field::Level,
            "datetime" => Field::Datetime,
            "process_name" => Field::ProcessName,
            "pid" => Field::Pid,
            "thread" => Field::Thread,
            "module" => Field::Module,
            "line" => Field::Line,
            "message" => Field::Message,
            "name" => Field::Name,
            "exception" => Field::Exception,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

pub fn level_name(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARNING",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

/// Renders records from a `{placeholder}` template, one line per record.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    segments: Vec<Segment>,
    datetime_format: String,
}

impl TemplateFormatter {
    pub fn new(template: &str) -> Result<Self> {
        Ok(Self {
            segments: parse(template)?,
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        })
    }

    pub fn with_datetime_format(self, datetime_format: impl Into<String>) -> Self {
        Self {
            datetime_format: datetime_format.into(),
            ..self
        }
    }

    fn has_exception_field(&self) -> bool {
        self.segments.contains(&Segment::Field(Field::Exception))
    }

    fn write_field(
        &self,
        line: &mut String,
        field: Field,
        name: &str,
        record: &log::Record,
        exception: Option<&str>,
    ) {
        // Writing into a String only fails on a bad strftime pattern, which renders empty.
        let _ = match field {
            Field::Level => write!(line, "{}", level_name(record.level())),
            Field::Datetime => write!(line, "{}", Local::now().format(&self.datetime_format)),
            Field::ProcessName => write!(line, "{}", utils::process_name()),
            Field::Pid => write!(line, "{}", std::process::id()),
            Field::Thread => write!(line, "{}", utils::thread_id()),
            Field::Module => write!(line, "{}", module(record)),
            Field::Line => write!(line, "{}", record.line().unwrap_or(0)),
            Field::Message => write!(line, "{}", record.args()),
            Field::Name => write!(line, "{}", name),
            Field::Exception => write!(line, "{}", exception.unwrap_or_default()),
        };
    }
}

impl Default for TemplateFormatter {
    fn default() -> Self {
        Self {
            segments: parse(DEFAULT_FORMAT).unwrap_or_default(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

impl LogFormatter for TemplateFormatter {
    fn format(&self, name: &str, record: &log::Record, exception: Option<&str>) -> String {
        let exception = exception.map(escape);
        let mut line = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Field(field) => {
                    self.write_field(&mut line, *field, name, record, exception.as_deref())
                }
            }
        }

        if let Some(exception) = exception.filter(|_| !self.has_exception_field()) {
            let _ = write!(line, "; 'exception'='{}'", exception);
        }

        // One record per line, whatever the message or template carries.
        line.retain(|c| c != '\n' && c != '\r');
        line
    }
}

fn module<'a>(record: &log::Record<'a>) -> &'a str {
    record
        .file()
        .and_then(|file| Path::new(file).file_stem())
        .and_then(|stem| stem.to_str())
        .or_else(|| {
            record
                .module_path()
                .and_then(|path| path.rsplit("::").next())
        })
        .unwrap_or("unknown")
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let invalid = |reason: String| Error::InvalidFormat {
        format: template.to_string(),
        reason,
    };

    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }

        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;
        let placeholder = &after[..end];
        let field = Field::from_name(placeholder)
            .ok_or_else(|| invalid(format!("unknown placeholder `{}`", placeholder)))?;

        segments.push(Segment::Field(field));
        rest = &after[end + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(segments)
}
