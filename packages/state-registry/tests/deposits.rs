mod helpers;

use std::{cell::RefCell, rc::Rc};

use cosmwasm_std::{from_json, DepsMut, Env, Uint256};
use helpers::*;
use registry_bindings::{
    payload::{AmbMessage, CallbackType, ReturnMultiData, ReturnSingleData, TransactionType},
    Host, Role,
};
use state_registry::{core, dst_swapper, msg::SwapRequest, state::PayloadState, ContractError};

fn stored_deposit(r: &mut Registry, amount: u128) -> u64 {
    let id = r.deliver_with_quorum(&deposit_message(vec![deposit_vault(amount)]));
    r.bank
        .mint(&addr(USDC), &addr(CORE), Uint256::from(amount));
    id
}

#[test]
fn deposit_round_trip() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    let evt = r.update_deposit(id, &[995]).unwrap();
    assert_eq!(Some("UPDATED"), attribute(&evt, "state"));
    assert_eq!(
        PayloadState::Updated,
        core::query_payload_state(r.deps.as_ref(), id).unwrap()
    );

    let events = r.process(id).unwrap();
    assert_eq!(1, events.len());
    assert_eq!(Some("1"), attribute(&events[0], "acknowledged"));

    assert_eq!(Uint256::from(995u128), r.balance(USDC, VAULT));
    assert_eq!(Uint256::from(5u128), r.balance(USDC, CORE));

    let deposits = r.vault.deposits();
    assert_eq!(1, deposits.len());
    assert_eq!(Uint256::from(995u128), deposits[0].vault.amount);

    // The full acknowledgement goes over the first AMB and its proof over the second.
    let full = r.ambs[0].dispatched();
    let proof = r.ambs[1].dispatched();
    assert_eq!(1, full.len());
    assert_eq!(1, proof.len());
    assert!(r.ambs[2].dispatched().is_empty());

    let ack: AmbMessage = from_json(&full[0].message).unwrap();
    assert_eq!(REMOTE, full[0].dst_chain_id);
    assert_eq!(addr(CORE), full[0].sender);
    assert_eq!(
        ack.to_proof().unwrap(),
        from_json::<AmbMessage>(&proof[0].message).unwrap()
    );

    let AmbMessage::Payload { header, body, .. } = ack else {
        panic!("acknowledgement is not a payload");
    };
    assert_eq!(CallbackType::Return, header.callback);
    assert_eq!(TransactionType::Deposit, header.tx_type);
    assert_eq!(LOCAL, header.src_chain_id);
    assert_eq!(addr(USER), header.src_sender);

    let data: ReturnSingleData = from_json(&body).unwrap();
    assert_eq!(77, data.payload_id);
    assert_eq!(Uint256::from(995u128), data.amount);

    // Fees default to the estimate: base fee plus gas per byte of what each AMB carries.
    for d in full.iter().chain(&proof) {
        let gas = Uint256::from(2u128 * d.message.len() as u128);
        assert_eq!(Uint256::from(1_000u128) + gas, d.fee);
        assert_eq!(gas.to_be_bytes().to_vec(), d.extra_data.to_vec());
    }
}

#[test]
fn slippage_floor_is_inclusive() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    // 1% of 1000 leaves a floor of 990.
    let evt = r.update_deposit(id, &[990]).unwrap();
    assert_eq!(Some("0"), attribute(&evt, "failed_deposits"));
    assert!(core::query_failed_deposits(r.deps.as_ref(), id)
        .unwrap()
        .is_none());
}

#[test]
fn below_floor_becomes_failed_deposit() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    let evt = r.update_deposit(id, &[989]).unwrap();
    assert_eq!(Some("PROCESSED"), attribute(&evt, "state"));

    let failed = core::query_failed_deposits(r.deps.as_ref(), id)
        .unwrap()
        .unwrap();
    assert_eq!(1, failed.entries.len());
    assert_eq!(addr(USDC), failed.entries[0].settlement_token);
    assert!(!failed.entries[0].from_dst_swapper);
    assert_eq!(addr(USER), failed.receiver);
    assert!(failed.last_proposed.is_none());

    let err = r.process(id).unwrap_err();
    assert_error(&err, ContractError::PayloadAlreadyProcessed);
    assert!(r.vault.deposits().is_empty());
}

#[test]
fn partial_failure_acknowledges_the_rest() {
    let mut r = proper_instantiate();
    let id = r.deliver_with_quorum(&deposit_message(vec![
        deposit_vault(1_000),
        deposit_vault(500),
    ]));
    r.bank
        .mint(&addr(USDC), &addr(CORE), Uint256::from(1_500u128));

    r.update_deposit(id, &[1_000, 100]).unwrap();
    let events = r.process(id).unwrap();
    assert_eq!(2, events.len());
    assert_eq!("FailedXChainDeposits", events[1].ty);

    assert_eq!(Uint256::from(1_000u128), r.balance(USDC, VAULT));
    assert_eq!(1, r.vault.deposits().len());

    let AmbMessage::Payload { header, body, .. } =
        from_json::<AmbMessage>(&r.ambs[0].dispatched()[0].message).unwrap()
    else {
        panic!("acknowledgement is not a payload");
    };
    assert!(header.multi);
    let data: ReturnMultiData = from_json(&body).unwrap();
    assert_eq!(vec![Uint256::from(1_000u128)], data.amounts);
}

#[test]
fn final_amount_above_instruction() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    let err = r.update_deposit(id, &[1_001]).unwrap_err();
    assert_error(&err, ContractError::NegativeSlippage);

    let err = r.update_deposit(id, &[1_000, 1]).unwrap_err();
    assert_error(&err, ContractError::ArrayLengthMismatch);
}

#[test]
fn update_waits_for_dst_swap() {
    let mut r = proper_instantiate();
    let id = r.deliver_with_quorum(&deposit_message(vec![swap_vault(1_000)]));
    r.bank
        .mint(&addr(WETH), &addr(SWAPPER), Uint256::from(1_000u128));

    let err = r.update_deposit(id, &[1_000]).unwrap_err();
    assert_error(&err, ContractError::DstSwapPending);
    assert!(ContractError::DstSwapPending.is_retryable());

    // The same update goes through once the keeper has swapped.
    r.bridge
        .push_output(&addr(USDC), &addr(CORE), Uint256::from(1_000u128));
    dst_swapper::process_tx(
        r.deps.as_mut(),
        &r.env,
        &info(KEEPER),
        &r.host,
        id,
        &SwapRequest {
            index: 0,
            bridge_id: BRIDGE_ID,
            tx_data: swap_tx(1_000),
        },
    )
    .unwrap();
    r.update_deposit(id, &[1_000]).unwrap();

    let err = r.update_deposit(id, &[1_000]).unwrap_err();
    assert_error(&err, ContractError::PayloadAlreadyUpdated);
}

#[test]
fn update_once() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    r.update_deposit(id, &[1_000]).unwrap();
    let err = r.update_deposit(id, &[1_000]).unwrap_err();
    assert_error(&err, ContractError::PayloadAlreadyUpdated);

    r.process(id).unwrap();
    let err = r.update_deposit(id, &[1_000]).unwrap_err();
    assert_error(&err, ContractError::InvalidPayloadStatus);
}

#[test]
fn deposit_must_be_updated_before_processing() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    let err = r.process(id).unwrap_err();
    assert_error(&err, ContractError::PayloadNotUpdated);
}

#[test]
fn process_once() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);
    r.update_deposit(id, &[1_000]).unwrap();

    r.process(id).unwrap();
    let err = r.process(id).unwrap_err();
    assert_error(&err, ContractError::PayloadAlreadyProcessed);
    assert_eq!(1, r.vault.deposits().len());
}

#[test]
fn roles_are_enforced() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);

    let err = core::update_deposit_payload(
        r.deps.as_mut(),
        &info(PROCESSOR),
        &r.host,
        id,
        &[Uint256::from(1_000u128)],
    )
    .unwrap_err();
    assert_error(
        &err,
        ContractError::NotPrivilegedCaller(Role::CoreStateRegistryUpdater),
    );

    r.update_deposit(id, &[1_000]).unwrap();
    let err = core::process_payload(r.deps.as_mut(), &r.env, &info(UPDATER), &r.host, id, None)
        .unwrap_err();
    assert_error(
        &err,
        ContractError::NotPrivilegedCaller(Role::CoreStateRegistryProcessor),
    );
}

#[test]
fn vault_cannot_reenter_processing() {
    let mut r = proper_instantiate();
    let id = stored_deposit(&mut r, 1_000);
    r.update_deposit(id, &[1_000]).unwrap();

    let nested = Rc::new(RefCell::new(None));
    let seen = nested.clone();
    r.vault.set_reentry(Rc::new(move |deps: DepsMut, env: &Env, host: &dyn Host| {
        let res = core::process_payload(deps, env, &info(PROCESSOR), host, id, None);
        *seen.borrow_mut() = Some(res.map(|_| ()));
    }));

    r.process(id).unwrap();

    let nested = nested.borrow_mut().take().unwrap();
    assert_error(&nested.unwrap_err(), ContractError::PayloadAlreadyProcessed);
    assert_eq!(1, r.vault.deposits().len());
    assert_eq!(1, r.ambs[0].dispatched().len());
}

#[test]
fn acknowledgements_are_synced() {
    let mut r = proper_instantiate();
    let message = match deposit_message(vec![deposit_vault(1_000)]) {
        AmbMessage::Payload {
            mut header,
            amb_ids,
            body,
        } => {
            header.callback = CallbackType::Return;
            AmbMessage::Payload {
                header,
                amb_ids,
                body,
            }
        }
        proof => proof,
    };

    let id = r.deliver_with_quorum(&message);
    r.process(id).unwrap();

    assert_eq!(vec![message], r.positions.synced());
}
