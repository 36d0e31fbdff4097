//! Calldata generation from JSON ABI documents

use alloy::dyn_abi::{DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes};
use serde_json::Value;
use std::path::Path;

use crate::error::{AgentError, Result};

/// Everything needed to build one contract call.
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub contract: Address,
    pub abi: JsonAbi,
    pub function: String,
    pub params: Vec<DynSolValue>,
}

impl CallSpec {
    pub fn calldata(&self) -> Result<Bytes> {
        encode_calldata(&self.abi, &self.function, &self.params)
    }
}

/// Reads an ABI file: either a bare ABI array or a build artifact with an
/// `abi` field.
pub fn load_abi(path: &Path) -> Result<JsonAbi> {
    let raw = std::fs::read(path)?;
    let doc: Value = serde_json::from_slice(&raw)
        .map_err(|e| AgentError::config(format!("invalid ABI file {}: {}", path.display(), e)))?;
    let abi = match doc {
        Value::Object(mut artifact) => artifact.remove("abi").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(abi)
        .map_err(|e| AgentError::config(format!("invalid ABI in {}: {}", path.display(), e)))
}

/// Looks up `name` taking `arity` arguments. Overloads with the same arity
/// resolve to the first declared.
pub fn find_function<'a>(abi: &'a JsonAbi, name: &str, arity: usize) -> Result<&'a Function> {
    abi.function(name)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        .ok_or_else(|| {
            AgentError::config(format!("Function {} with {} argument(s) not found in ABI", name, arity))
        })
}

pub fn encode_calldata(abi: &JsonAbi, name: &str, params: &[DynSolValue]) -> Result<Bytes> {
    let function = find_function(abi, name, params.len())?;
    let calldata = function
        .abi_encode_input(params)
        .map_err(|e| AgentError::config(format!("cannot encode arguments for {}: {}", function.signature(), e)))?;
    Ok(Bytes::from(calldata))
}

/// Parses textual arguments against the input types of `name`.
pub fn coerce_params(abi: &JsonAbi, name: &str, args: &[String]) -> Result<Vec<DynSolValue>> {
    let function = find_function(abi, name, args.len())?;
    function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| AgentError::config(format!("unsupported type {}: {}", param.ty, e)))?;
            ty.coerce_str(arg)
                .map_err(|e| AgentError::config(format!("argument {:?} is not a valid {}: {}", arg, param.ty, e)))
        })
        .collect()
}
