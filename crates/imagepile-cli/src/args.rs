//! Verb argument handling beyond what clap models directly.

use anyhow::{bail, Result};

use imagepile_store::BLOCK_SIZE;

/// Resolved arguments of the `add` verb.
#[derive(Debug, PartialEq, Eq)]
pub struct AddArgs<'a> {
    pub head_skip: u32,
    pub input: &'a str,
    pub descriptor_out: &'a str,
}

/// Split `add`'s positionals: `[head_skip] <input> <descriptor_out>`.
///
/// The original tool takes the optional byte offset as a leading
/// positional, so three values mean the first one is `head_skip`.
pub fn split_add_args(args: &[String]) -> Result<AddArgs<'_>> {
    match args {
        [input, descriptor_out] => Ok(AddArgs {
            head_skip: 0,
            input,
            descriptor_out,
        }),
        [head_skip, input, descriptor_out] => {
            let head_skip: u32 = head_skip
                .parse()
                .map_err(|_| anyhow::anyhow!("head_skip '{head_skip}' is not a byte count"))?;
            if head_skip >= BLOCK_SIZE as u32 {
                bail!("head_skip {head_skip} must be below the block size ({BLOCK_SIZE})");
            }
            Ok(AddArgs {
                head_skip,
                input,
                descriptor_out,
            })
        }
        _ => bail!("add takes [head_skip] <input> <descriptor_out>"),
    }
}
