use alloy::sol;

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ILayerZeroEndpoint {
        struct UaConfig {
            uint16 sendVersion;
            uint16 receiveVersion;
            address receiveLibraryAddress;
            address sendLibrary;
        }

        function uaConfigLookup(address userApplication) external view returns (UaConfig memory);
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ILayerZeroUserApplicationConfig {
        function setConfig(uint16 version, uint16 chainId, uint256 configType, bytes calldata config) external;
        function setSendVersion(uint16 version) external;
        function setReceiveVersion(uint16 version) external;
        function getConfig(uint16 version, uint16 chainId, address userApplication, uint256 configType) external view returns (bytes memory);
    }
);

/// Name recorded on every change targeting the user application.
pub const UA_CONTRACT_NAME: &str = "ILayerZeroUserApplicationConfig";
