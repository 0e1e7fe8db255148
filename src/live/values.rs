//! Typed views of reply arguments

use rosc::OscType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LiveError, LiveResult};
use crate::osc::{osc_number, OscReply};

/// A device parameter value as delivered by Live
///
/// Values arrive either as numbers (`parameter/value`) or as display text
/// (`parameter/value_string`); the type is preserved as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn from_osc(arg: &OscType) -> Option<Self> {
        match arg {
            OscType::String(s) => Some(ParamValue::Text(s.clone())),
            OscType::Bool(b) => Some(ParamValue::Number(if *b { 1.0 } else { 0.0 })),
            other => osc_number(other).map(ParamValue::Number),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Boolean view: Live sends booleans as `T`/`F` or as 0/1 depending on the property
pub fn osc_bool(arg: &OscType) -> Option<bool> {
    match arg {
        OscType::Bool(b) => Some(*b),
        other => osc_number(other).map(|n| n != 0.0),
    }
}

fn arg<'a>(reply: &'a OscReply, index: usize) -> LiveResult<&'a OscType> {
    reply.args.get(index).ok_or_else(|| {
        LiveError::protocol(
            &reply.address,
            format!("expected argument {} but reply has {}", index, reply.args.len()),
        )
    })
}

pub(crate) fn arg_i32(reply: &OscReply, index: usize) -> LiveResult<i32> {
    let value = arg(reply, index)?;
    osc_number(value)
        .map(|n| n as i32)
        .ok_or_else(|| LiveError::protocol(&reply.address, format!("argument {} is not numeric: {:?}", index, value)))
}

pub(crate) fn arg_f64(reply: &OscReply, index: usize) -> LiveResult<f64> {
    let value = arg(reply, index)?;
    osc_number(value)
        .ok_or_else(|| LiveError::protocol(&reply.address, format!("argument {} is not numeric: {:?}", index, value)))
}

pub(crate) fn arg_bool(reply: &OscReply, index: usize) -> LiveResult<bool> {
    let value = arg(reply, index)?;
    osc_bool(value)
        .ok_or_else(|| LiveError::protocol(&reply.address, format!("argument {} is not boolean: {:?}", index, value)))
}

pub(crate) fn arg_string(reply: &OscReply, index: usize) -> LiveResult<String> {
    match arg(reply, index)? {
        OscType::String(s) => Ok(s.clone()),
        other => Err(LiveError::protocol(
            &reply.address,
            format!("argument {} is not a string: {:?}", index, other),
        )),
    }
}

/// Everything after the echoed indices, as strings
pub(crate) fn strings_after(reply: &OscReply, skip: usize) -> LiveResult<Vec<String>> {
    reply
        .args
        .iter()
        .skip(skip)
        .map(|value| match value {
            OscType::String(s) => Ok(s.clone()),
            other => Err(LiveError::protocol(
                &reply.address,
                format!("expected string, got {:?}", other),
            )),
        })
        .collect()
}

/// Everything after the echoed indices, as parameter values
pub(crate) fn values_after(reply: &OscReply, skip: usize) -> LiveResult<Vec<ParamValue>> {
    reply
        .args
        .iter()
        .skip(skip)
        .map(|value| {
            ParamValue::from_osc(value).ok_or_else(|| {
                LiveError::protocol(&reply.address, format!("unsupported value {:?}", value))
            })
        })
        .collect()
}
