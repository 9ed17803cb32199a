//! Transaction builders, one per action kind.
//!
//! Pure composition: resolved addresses and amounts in, an ordered
//! instruction list plus a sponsor-fee-paid, sponsor-partially-signed
//! transaction out. Deterministic given identical inputs; the only
//! "randomness" is the one-time seed a caller generates for new
//! on-chain sub-accounts and threads through.
//!
//! Role invariant, enforced here by construction and by check: the
//! acting human or agent is always the authority/signer-of-record, and
//! the sponsor is always and only the fee payer. A sponsor address in
//! an authority or member position is a [`BuilderError`].

use stipend_core::{programs, AccountMeta, Address, Blockhash, Instruction, Keypair, Transaction};

use crate::accounts::{budget_address, proposal_address, settings_address, vault_address, MultisigOp};
use crate::error::BuilderError;

/// A composed, sponsor-signed (only) transaction.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// The ordered instructions, as composed.
    pub instructions: Vec<Instruction>,
    /// The assembled transaction, fee-paid and partially signed by the
    /// sponsor. Remaining signatures come from the authority or agent.
    pub transaction: Transaction,
}

fn reject_sponsor_roles(
    sponsor: &Keypair,
    role_addresses: &[&Address],
) -> Result<(), BuilderError> {
    let sponsor_address: Address = sponsor.public_key().into();
    if role_addresses.iter().any(|a| **a == sponsor_address) {
        return Err(BuilderError::SponsorIsAuthority);
    }
    Ok(())
}

fn assemble(
    sponsor: &Keypair,
    blockhash: Blockhash,
    instructions: Vec<Instruction>,
) -> BuiltTransaction {
    let mut transaction = Transaction::new(
        sponsor.public_key().into(),
        blockhash,
        instructions.clone(),
    );
    transaction.sign_with(sponsor);
    BuiltTransaction {
        instructions,
        transaction,
    }
}

fn multisig_instruction(accounts: Vec<AccountMeta>, op: &MultisigOp) -> Instruction {
    Instruction {
        program: programs::multisig(),
        accounts,
        data: op.to_bytes().into(),
    }
}

/// Create a workspace: settings account plus derived vault. `seed` is
/// the caller-generated one-time create key.
pub fn build_create_workspace(
    sponsor: &Keypair,
    creator: Address,
    threshold: u32,
    seed: &Address,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&creator])?;
    let settings = settings_address(seed);
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(vault_address(&settings)),
            AccountMeta::signer(creator),
        ],
        &MultisigOp::CreateSettings { creator, threshold },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Add a member (human, or an agent being activated) to the settings.
pub fn build_add_member(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    member: Address,
    is_agent: bool,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority, &member])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::signer(authority),
            AccountMeta::readonly(member),
        ],
        &MultisigOp::AddMember { member, is_agent },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Remove a member (or revoke an agent's on-chain membership).
pub fn build_remove_member(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    member: Address,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority, &member])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::signer(authority),
            AccountMeta::readonly(member),
        ],
        &MultisigOp::RemoveMember { member },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Create (or replace) an agent's on-chain budget account.
pub fn build_create_budget(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    agent: Address,
    token_mint: Address,
    limit_amount: u64,
    period_type: &str,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority, &agent])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(budget_address(&settings, &agent)),
            AccountMeta::signer(authority),
        ],
        &MultisigOp::CreateBudget {
            agent,
            token_mint,
            limit_amount,
            period_type: period_type.to_string(),
        },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Remove an agent's on-chain budget account.
pub fn build_remove_budget(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    agent: Address,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority, &agent])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(budget_address(&settings, &agent)),
            AccountMeta::signer(authority),
        ],
        &MultisigOp::RemoveBudget { agent },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Draw an in-budget amount from the vault. Single signature round:
/// sponsor (fee) plus the agent.
pub fn build_draw_budget(
    sponsor: &Keypair,
    settings: Address,
    agent: Address,
    recipient: Address,
    amount: u64,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    if amount == 0 {
        return Err(BuilderError::ZeroAmount);
    }
    reject_sponsor_roles(sponsor, &[&agent, &recipient])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(budget_address(&settings, &agent)),
            AccountMeta::writable(vault_address(&settings)),
            AccountMeta::signer(agent),
            AccountMeta::writable(recipient),
        ],
        &MultisigOp::DrawBudget {
            agent,
            recipient,
            amount,
        },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Execute a validated instruction batch through the multisig program,
/// with the vault as program-side authority. Single signature round:
/// sponsor (fee) plus the agent.
pub fn build_execute_batch(
    sponsor: &Keypair,
    settings: Address,
    agent: Address,
    inner: Vec<Instruction>,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&agent])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(vault_address(&settings)),
            AccountMeta::signer(agent),
        ],
        &MultisigOp::ExecuteBatch { instructions: inner },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Create an over-budget approval proposal at the given transaction
/// index.
pub fn build_create_proposal(
    sponsor: &Keypair,
    settings: Address,
    agent: Address,
    index: u64,
    recipient: Address,
    amount: u64,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    if amount == 0 {
        return Err(BuilderError::ZeroAmount);
    }
    reject_sponsor_roles(sponsor, &[&agent, &recipient])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(proposal_address(&settings, index)),
            AccountMeta::signer(agent),
        ],
        &MultisigOp::CreateProposal {
            index,
            recipient,
            amount,
        },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Approve a proposal as a human member; executes once the threshold
/// is met on-chain.
pub fn build_approve_proposal(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    proposal: Address,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(proposal),
            AccountMeta::writable(vault_address(&settings)),
            AccountMeta::signer(authority),
        ],
        &MultisigOp::ApproveProposal { proposal },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

/// Deny a proposal as a human member.
pub fn build_deny_proposal(
    sponsor: &Keypair,
    settings: Address,
    authority: Address,
    proposal: Address,
    blockhash: Blockhash,
) -> Result<BuiltTransaction, BuilderError> {
    reject_sponsor_roles(sponsor, &[&authority])?;
    let ix = multisig_instruction(
        vec![
            AccountMeta::writable(settings),
            AccountMeta::writable(proposal),
            AccountMeta::signer(authority),
        ],
        &MultisigOp::DenyProposal { proposal },
    );
    Ok(assemble(sponsor, blockhash, vec![ix]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sponsor() -> Keypair {
        Keypair::from_seed(&[0xA0; 32])
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn sponsor_is_fee_payer_and_never_an_instruction_signer() {
        let sponsor = sponsor();
        let built = build_add_member(
            &sponsor,
            addr(1),
            addr(2),
            addr(3),
            true,
            Blockhash::ZERO,
        )
        .unwrap();

        let sponsor_address: Address = sponsor.public_key().into();
        assert_eq!(built.transaction.fee_payer, sponsor_address);
        for ix in &built.instructions {
            assert!(ix
                .accounts
                .iter()
                .all(|meta| !(meta.is_signer && meta.address == sponsor_address)));
        }
        // Partially signed: the authority still has to sign.
        assert_eq!(built.transaction.missing_signers(), vec![addr(2)]);
    }

    #[test]
    fn sponsor_as_authority_is_rejected() {
        let sponsor = sponsor();
        let sponsor_address: Address = sponsor.public_key().into();
        let err = build_add_member(
            &sponsor,
            addr(1),
            sponsor_address,
            addr(3),
            false,
            Blockhash::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, BuilderError::SponsorIsAuthority));

        let err = build_add_member(
            &sponsor,
            addr(1),
            addr(2),
            sponsor_address,
            false,
            Blockhash::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, BuilderError::SponsorIsAuthority));
    }

    #[test]
    fn builders_are_deterministic() {
        let sponsor = sponsor();
        let a = build_draw_budget(&sponsor, addr(1), addr(2), addr(3), 40, Blockhash::ZERO)
            .unwrap();
        let b = build_draw_budget(&sponsor, addr(1), addr(2), addr(3), 40, Blockhash::ZERO)
            .unwrap();
        assert_eq!(a.transaction.message_bytes(), b.transaction.message_bytes());
    }

    #[test]
    fn zero_amount_draw_rejected() {
        let err = build_draw_budget(&sponsor(), addr(1), addr(2), addr(3), 0, Blockhash::ZERO)
            .unwrap_err();
        assert!(matches!(err, BuilderError::ZeroAmount));
    }

    #[test]
    fn create_workspace_derives_settings_from_seed() {
        let built =
            build_create_workspace(&sponsor(), addr(2), 2, &addr(9), Blockhash::ZERO).unwrap();
        let expected = settings_address(&addr(9));
        assert_eq!(built.instructions[0].accounts[0].address, expected);
        assert_eq!(
            built.instructions[0].accounts[1].address,
            vault_address(&expected)
        );
    }

    #[test]
    fn draw_requires_agent_signature() {
        let built =
            build_draw_budget(&sponsor(), addr(1), addr(2), addr(3), 40, Blockhash::ZERO)
                .unwrap();
        assert_eq!(built.transaction.missing_signers(), vec![addr(2)]);
    }

    #[test]
    fn op_payload_decodes_back() {
        let built =
            build_create_proposal(&sponsor(), addr(1), addr(2), 5, addr(3), 70, Blockhash::ZERO)
                .unwrap();
        let op = MultisigOp::from_bytes(&built.instructions[0].data).unwrap();
        assert_eq!(
            op,
            MultisigOp::CreateProposal {
                index: 5,
                recipient: addr(3),
                amount: 70
            }
        );
    }
}
