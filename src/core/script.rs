//! Fixed-opcode P2PKH script check
//!
//! No general script language lives here. The only spendable form is
//! pay-to-pubkey-hash, evaluated as the fixed sequence
//! `<sig> <pubkey> OP_DUP OP_HASH160 <pk_script> OP_EQUALVERIFY OP_CHECKSIG`
//! over a byte-vector stack, with OP_CHECKSIG verifying the DER signature
//! against the spending transaction's txid.

use crate::utils::{ecdsa_verify, hash160};

/// Expected lock script length, the hash160 of a public key.
pub const PK_SCRIPT_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    OpDup,
    OpHash160,
    OpEqualVerify,
    OpCheckSig,
}

enum ScriptItem {
    Push(Vec<u8>),
    Op(Opcode),
}

struct Interpreter<'a> {
    stack: Vec<Vec<u8>>,
    message: &'a [u8],
}

impl<'a> Interpreter<'a> {
    fn new(message: &'a [u8]) -> Interpreter<'a> {
        Interpreter {
            stack: Vec::with_capacity(4),
            message,
        }
    }

    fn pop(&mut self) -> Result<Vec<u8>, String> {
        self.stack
            .pop()
            .ok_or_else(|| "Script stack underflow".to_string())
    }

    fn execute(&mut self, item: ScriptItem) -> Result<(), String> {
        match item {
            ScriptItem::Push(data) => {
                self.stack.push(data);
                Ok(())
            }
            ScriptItem::Op(Opcode::OpDup) => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| "Script stack underflow".to_string())?;
                self.stack.push(top);
                Ok(())
            }
            ScriptItem::Op(Opcode::OpHash160) => {
                let top = self.pop()?;
                self.stack.push(hash160(&top));
                Ok(())
            }
            ScriptItem::Op(Opcode::OpEqualVerify) => {
                let a = self.pop()?;
                let b = self.pop()?;
                if a == b {
                    Ok(())
                } else {
                    Err("Public key hash does not match lock script (OP_EQUALVERIFY)".to_string())
                }
            }
            ScriptItem::Op(Opcode::OpCheckSig) => {
                let pub_key = self.pop()?;
                let signature = self.pop()?;
                if ecdsa_verify(&pub_key, &signature, self.message) {
                    Ok(())
                } else {
                    Err("Signature verification failed (OP_CHECKSIG)".to_string())
                }
            }
        }
    }
}

/// Run the P2PKH check for one input. `message` is the spending
/// transaction's txid. Returns the failing step's reason on rejection.
pub fn verify_p2pkh(
    signature: &[u8],
    pub_key: &[u8],
    pk_script: &[u8],
    message: &[u8],
) -> Result<(), String> {
    if pk_script.len() != PK_SCRIPT_LEN {
        return Err(format!(
            "Lock script must be {PK_SCRIPT_LEN} bytes, got {}",
            pk_script.len()
        ));
    }
    if signature.is_empty() {
        return Err("Missing input signature".to_string());
    }
    if pub_key.is_empty() {
        return Err("Missing input public key".to_string());
    }

    let script = [
        ScriptItem::Push(signature.to_vec()),
        ScriptItem::Push(pub_key.to_vec()),
        ScriptItem::Op(Opcode::OpDup),
        ScriptItem::Op(Opcode::OpHash160),
        ScriptItem::Push(pk_script.to_vec()),
        ScriptItem::Op(Opcode::OpEqualVerify),
        ScriptItem::Op(Opcode::OpCheckSig),
    ];

    let mut interpreter = Interpreter::new(message);
    for item in script {
        interpreter.execute(item)?;
    }

    if interpreter.stack.is_empty() {
        Ok(())
    } else {
        Err("Script left items on the stack".to_string())
    }
}
