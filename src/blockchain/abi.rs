use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};

use super::ChainError;

// Define Solidity interfaces using alloy's sol! macro

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    interface IERC721 {
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
    }
}

sol! {
    interface IERC1155 {
        function safeTransferFrom(address from, address to, uint256 id, uint256 value, bytes data) external;
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

// OP-stack GasPriceOracle predeploy
sol! {
    interface IGasPriceOracle {
        function getL1Fee(bytes data) external view returns (uint256);
    }
}

// Hop: L1 bridge and L2 AMM wrapper
sol! {
    interface IHopL1Bridge {
        function sendToL2(
            uint256 chainId,
            address recipient,
            uint256 amount,
            uint256 amountOutMin,
            uint256 deadline,
            address relayer,
            uint256 relayerFee
        ) external payable;
    }
}

sol! {
    interface IHopL2AmmWrapper {
        function swapAndSend(
            uint256 chainId,
            address recipient,
            uint256 amount,
            uint256 bonderFee,
            uint256 amountOutMin,
            uint256 deadline,
            uint256 destinationAmountOutMin,
            uint256 destinationDeadline
        ) external payable;
    }
}

// Celer cBridge
sol! {
    interface ICelerBridge {
        function send(
            address receiver,
            address token,
            uint256 amount,
            uint64 dstChainId,
            uint64 nonce,
            uint32 maxSlippage
        ) external;

        function sendNative(
            address receiver,
            uint256 amount,
            uint64 dstChainId,
            uint64 nonce,
            uint32 maxSlippage
        ) external payable;
    }
}

// ENS username registrar paid in SNT
sol! {
    interface IUsernameRegistrar {
        function register(bytes32 label, address account, bytes32 pubkeyA, bytes32 pubkeyB) external returns (bytes32);
        function getPrice() external view returns (uint256);
    }
}

sol! {
    interface ISNT {
        function approveAndCall(address spender, uint256 amount, bytes extraData) external returns (bool);
    }
}

/// ERC20 transfer call data
pub fn encode_erc20_transfer(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

/// ERC20 approve call data
pub fn encode_erc20_approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn encode_erc20_allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn encode_erc20_balance_of(account: Address) -> Bytes {
    IERC20::balanceOfCall { account }.abi_encode().into()
}

pub fn encode_erc721_safe_transfer(from: Address, to: Address, token_id: U256) -> Bytes {
    IERC721::safeTransferFromCall { from, to, tokenId: token_id }.abi_encode().into()
}

pub fn encode_erc1155_safe_transfer(from: Address, to: Address, id: U256, value: U256) -> Bytes {
    IERC1155::safeTransferFromCall { from, to, id, value, data: Bytes::new() }
        .abi_encode()
        .into()
}

pub fn encode_erc1155_balance_of(account: Address, id: U256) -> Bytes {
    IERC1155::balanceOfCall { account, id }.abi_encode().into()
}

pub fn encode_get_l1_fee(data: Bytes) -> Bytes {
    IGasPriceOracle::getL1FeeCall { data }.abi_encode().into()
}

pub fn encode_registrar_get_price() -> Bytes {
    IUsernameRegistrar::getPriceCall {}.abi_encode().into()
}

/// `approveAndCall(registrar, price, register(label, owner, x, y))` on SNT
pub fn encode_ens_register(
    registrar: Address,
    price: U256,
    label: B256,
    owner: Address,
    pubkey_x: B256,
    pubkey_y: B256,
) -> Bytes {
    let register = IUsernameRegistrar::registerCall {
        label,
        account: owner,
        pubkeyA: pubkey_x,
        pubkeyB: pubkey_y,
    };
    ISNT::approveAndCallCall {
        spender: registrar,
        amount: price,
        extraData: register.abi_encode().into(),
    }
    .abi_encode()
    .into()
}

/// Decode a single `uint256` return value
pub fn decode_uint256(data: &[u8]) -> Result<U256, ChainError> {
    U256::abi_decode(data).map_err(|e| ChainError::Decode(e.to_string()))
}
